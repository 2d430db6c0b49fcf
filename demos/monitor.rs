//! Prints the host's interfaces and the address records that would be announced for them.

use std::{env, io, process};

use ifmon::{Groups, Hostname, InterfaceMonitor, NetlinkSocket, RecordTable, RECV_BUFFER_SIZE};
use log::LevelFilter;

fn main() -> io::Result<()> {
    env_logger::Builder::new()
        .filter_module(env!("CARGO_PKG_NAME"), LevelFilter::Debug)
        .filter_module(env!("CARGO_CRATE_NAME"), LevelFilter::Trace)
        .init();

    let args = env::args().skip(1).collect::<Vec<_>>();
    let hostname: Hostname = match &*args {
        [] => "my_hostname".parse()?,
        [name] => name.parse()?,
        _ => {
            eprintln!("usage: monitor [hostname]");
            process::exit(1);
        }
    };

    let sock = NetlinkSocket::open(Groups::INTERFACES)?;
    sock.set_recv_buffer_size(256 * 1024)?;
    let mut mon = InterfaceMonitor::new(&sock, RecordTable::new(), hostname);

    let mut recv_buf = vec![0; RECV_BUFFER_SIZE];
    loop {
        let len = match sock.recv(&mut recv_buf) {
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                log::warn!("receive buffer overrun, notifications were lost");
                continue;
            }
            Err(e) => return Err(e),
        };
        mon.handle_datagram(&recv_buf[..len]);

        println!();
        print!("{}", mon.directory());
        for (id, record) in mon.record_store().iter() {
            println!("{}\t{}", id, record);
        }
    }
}
