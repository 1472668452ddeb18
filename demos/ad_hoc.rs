//! # Example: ad_hoc
//!
//! Single jobs outside any batch: a shell command and a registered function, both with
//! captured output and a timeout.
//!
//! Demonstrates how to:
//! - Register functions in a [`FunctionTable`] and serve them when re-executed.
//! - Run a shell command with [`run_command`].
//! - Run a function in an isolated process with [`run_function`].
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► table.serve() ── child? ──► run function, exit with its code
//!   ├─► run_command("uname -a")            ─► JobResult { Done, stdout }
//!   ├─► run_function(fib(25))              ─► re-exec self ─► JobResult { Done, stdout }
//!   └─► run_function(spin(), 500ms timeout) ─► process group terminated ─► Timeout
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example ad_hoc
//! ```

use std::time::Duration;

use jobvisor::{FunctionCall, FunctionTable, run_command, run_function};

fn fib(n: u64) -> u64 {
    if n < 2 { n } else { fib(n - 1) + fib(n - 2) }
}

fn table() -> FunctionTable {
    FunctionTable::new()
        .register("fib", |args, _kwargs| -> Result<(), String> {
            let n = args.first().and_then(|v| v.as_u64()).ok_or("fib(n) needs n")?;
            println!("{}", fib(n));
            Ok(())
        })
        .register("spin", |_args, _kwargs| -> Result<(), String> {
            loop {
                std::thread::sleep(Duration::from_millis(100));
            }
        })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Child side: a re-executed copy of this binary serves one call and exits
    if let Some(code) = table().serve() {
        std::process::exit(code);
    }

    // 2. Shell command
    let out = run_command("uname -a", Some(Duration::from_secs(5))).await;
    println!("[shell] {} -> {}", out.command, out.status);
    print!("{}", out.stdout.unwrap_or_default());

    // 3. Function in an isolated process
    let out = run_function(FunctionCall::new("fib").arg(25), None).await;
    println!("[function] {} -> {} ({:?})", out.command, out.status, out.elapsed);
    print!("{}", out.stdout.unwrap_or_default());

    // 4. Function over its timeout
    let out = run_function(FunctionCall::new("spin"), Some(Duration::from_millis(500))).await;
    println!("[function] {} -> {}", out.command, out.status);
    Ok(())
}
