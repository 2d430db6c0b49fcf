//! Watches the host's interfaces for a while, then prints the address records it ended up with.

use std::{env, io, process, time::Duration};

use async_io::Timer;
use ifmon_async::{AsyncInterfaceMonitor, Hostname, RecordTable};
use log::LevelFilter;

fn main() -> io::Result<()> {
    env_logger::Builder::new()
        .filter_module("ifmon", LevelFilter::Debug)
        .filter_module(env!("CARGO_PKG_NAME"), LevelFilter::Debug)
        .filter_module(env!("CARGO_CRATE_NAME"), LevelFilter::Trace)
        .init();

    let args = env::args().skip(1).collect::<Vec<_>>();
    let (hostname, secs): (Hostname, u64) = match &*args {
        [] => ("my_hostname".parse()?, 10),
        [name] => (name.parse()?, 10),
        [name, secs] => match secs.parse() {
            Ok(secs) => (name.parse()?, secs),
            Err(e) => {
                eprintln!("invalid duration `{}`: {}", secs, e);
                process::exit(1);
            }
        },
        _ => {
            eprintln!("usage: monitor-async [hostname] [seconds]");
            process::exit(1);
        }
    };

    let mut mon = AsyncInterfaceMonitor::new(RecordTable::new(), hostname)?;
    async_io::block_on(mon.listen_until(async {
        Timer::after(Duration::from_secs(secs)).await;
    }))?;

    println!("bootstrap: {:?}", mon.bootstrap_state());
    print!("{}", mon.monitor().directory());
    for (id, record) in mon.monitor().record_store().iter() {
        println!("{}\t{}", id, record);
    }

    Ok(())
}
