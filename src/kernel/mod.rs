// The simulation kernel boundary. Everything the scheduling/aggregation core
// needs from a kernel goes through this trait: address lookup, application
// install, the run itself, and the post-run flow records. EventKernel is the
// in-process reference implementation.

pub mod event;
pub mod link;

pub use event::EventKernel;
pub use link::{LinkConfig, LinkModel};

use crate::metrics::FlowRecord;
use crate::schedule::FlowSpec;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

pub const UDP_PROTOCOL: u8 = 17;

// Sequential host numbering over 10.0.0.0/8, the layout the topology files
// assume.
pub fn node_address(node: usize) -> Ipv4Addr {
    let host = node as u32 + 1;
    Ipv4Addr::new(10, (host >> 16) as u8, (host >> 8) as u8, host as u8)
}

// 5-tuple flow identity, ordered so record maps iterate in a stable order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FlowId {
    pub source: SocketAddrV4,
    pub destination: SocketAddrV4,
    pub protocol: u8,
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

pub trait Kernel {
    fn address_of(&self, node: usize) -> Ipv4Addr;

    fn install_receiver(&mut self, node: usize, port: u16);

    fn install_sender(&mut self, flow: &FlowSpec);

    // Advances the simulated clock to `until`, executing every event due
    // before it. Monotonic: a second call with a smaller bound is a no-op.
    fn run(&mut self, until: Duration) -> Result<()>;

    // Err means the kernel never produced records (fatal for the experiment),
    // which is NOT the same as a successful run that recorded zero flows.
    fn flow_stats(&self) -> Result<BTreeMap<FlowId, FlowRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_are_sequential() {
        assert_eq!(node_address(0), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(node_address(13), Ipv4Addr::new(10, 0, 0, 14));
        assert_eq!(node_address(255), Ipv4Addr::new(10, 0, 1, 0));
    }

    #[test]
    fn flow_ids_order_by_source_then_destination() {
        let a = FlowId {
            source: SocketAddrV4::new(node_address(14), 49152),
            destination: SocketAddrV4::new(node_address(0), 4000),
            protocol: UDP_PROTOCOL,
        };
        let b = FlowId {
            source: SocketAddrV4::new(node_address(15), 49153),
            destination: SocketAddrV4::new(node_address(0), 4000),
            protocol: UDP_PROTOCOL,
        };
        assert!(a < b);
    }
}
