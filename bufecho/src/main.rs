#[macro_use]
extern crate log;

use anyhow::{bail, Context, Result};
use bufecho::binding::{Exports, Value, HELLO_EXPORT};
use bufecho::blueprint::Blueprint;
use clap::Parser;

mod cli;

fn main() -> Result<()> {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());

    pretty_env_logger::formatted_builder()
        .parse_filters(&level)
        .format_timestamp_secs()
        .init();

    let args = cli::Args::parse();
    if args.input.is_none() && args.blueprint.is_none() {
        bail!("nothing to do, pass a blueprint and/or --input");
    }

    if let Some(mut input) = args.input {
        let out = Exports::new()
            .call(HELLO_EXPORT, &mut [Value::Buffer(&mut input)])
            .context("in process call failed")?;
        println!("input:  {input:?}");
        println!("output: {out:?}");
    }

    let Some(path) = args.blueprint else {
        return Ok(());
    };

    info!("reading blueprint {path:?}");
    let bp = Blueprint::new(&path).with_context(|| format!("could not read {path:?}"))?;
    info!("loading guests");
    let runs = bp.load_guests(args.strict)?;

    if args.only_validate {
        info!("validated {} guests", runs.len());
        return Ok(());
    }

    for mut run in runs {
        for n in 0..run.calls {
            let now = std::time::Instant::now();
            let result = run.guest.call_entry(&run.entry)?;
            debug!("call {n} took {:?}", now.elapsed());
            info!("calling {}.{} yielded {result}", run.guest.name, run.entry);
        }
        info!(
            "{} called {HELLO_EXPORT} {} times",
            run.guest.name,
            run.guest.hello_calls()
        );
    }

    Ok(())
}
