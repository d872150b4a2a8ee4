// Reference discrete-event kernel: a binary-heap event queue over simulated
// time, UDP-like sender/receiver apps, and per-flow counters keyed by
// 5-tuple. Single hop only, routing belongs to a real kernel.

use super::link::{Delivery, LinkModel};
use super::{node_address, FlowId, Kernel, UDP_PROTOCOL};
use crate::metrics::FlowRecord;
use crate::schedule::FlowSpec;
use crate::topology::Position;
use anyhow::{bail, Result};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashSet};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::debug;

// base of the ephemeral source-port range, one port per installed sender
const SOURCE_PORT_BASE: u16 = 49152;

// A zero interval on an unlimited-budget flow would never advance the clock.
const MIN_SEND_SPACING: Duration = Duration::from_micros(1);

#[derive(Debug, Clone)]
enum Event {
    Send { sender: usize },
    Deliver { flow: FlowId, sent_at: Duration, size: u32 },
}

#[derive(Debug)]
struct ScheduledEvent {
    at: Duration,
    seq: u64,
    event: Event,
}

// BinaryHeap is a max-heap; compare reversed for earliest-first, with the
// insertion sequence breaking ties so ordering is total and deterministic.
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

#[derive(Debug)]
struct SenderState {
    spec: FlowSpec,
    flow_id: FlowId,
    sent: u64,
}

pub struct EventKernel {
    positions: Vec<Position>,
    link: LinkModel,
    clock: Duration,
    seq: u64,
    queue: BinaryHeap<ScheduledEvent>,
    receivers: HashSet<(usize, u16)>,
    senders: Vec<SenderState>,
    records: BTreeMap<FlowId, FlowRecord>,
    ran: bool,
}

impl EventKernel {
    pub fn new(positions: Vec<Position>, link: LinkModel) -> Self {
        Self {
            positions,
            link,
            clock: Duration::ZERO,
            seq: 0,
            queue: BinaryHeap::new(),
            receivers: HashSet::new(),
            senders: Vec::new(),
            records: BTreeMap::new(),
            ran: false,
        }
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    // The scheduling primitive everything else builds on.
    fn schedule_at(&mut self, at: Duration, event: Event) {
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(ScheduledEvent { at, seq, event });
    }

    fn handle_send(&mut self, sender: usize) {
        let now = self.clock;
        let (flow_id, spec) = {
            let state = &self.senders[sender];
            (state.flow_id, state.spec.clone())
        };

        if now >= spec.stop {
            return;
        }
        if spec.max_packets != 0 && self.senders[sender].sent >= spec.max_packets {
            return;
        }

        self.senders[sender].sent += 1;
        let sent_so_far = self.senders[sender].sent;

        {
            let record = self.records.entry(flow_id).or_default();
            if record.tx_packets == 0 {
                record.first_tx = now;
            }
            record.tx_packets += 1;
            record.tx_bytes += spec.packet_size as u64;
        }

        let verdict = match (
            self.positions.get(spec.source),
            self.positions.get(spec.destination_node),
        ) {
            (Some(src), Some(dst)) => self.link.verdict(src.distance(dst)),
            // a node without a position can't reach anyone
            _ => Delivery::OutOfRange,
        };

        let receiver_up = self
            .receivers
            .contains(&(spec.destination_node, spec.destination.port()));

        match verdict {
            Delivery::Delivered { delay } if receiver_up => {
                self.schedule_at(
                    now + delay,
                    Event::Deliver {
                        flow: flow_id,
                        sent_at: now,
                        size: spec.packet_size,
                    },
                );
            }
            other => {
                if matches!(other, Delivery::Delivered { .. }) {
                    debug!("no receiver on {}, packet dropped", spec.destination);
                }
                if let Some(record) = self.records.get_mut(&flow_id) {
                    record.lost_packets += 1;
                }
            }
        }

        let budget_left = spec.max_packets == 0 || sent_so_far < spec.max_packets;
        let next = now + spec.interval.max(MIN_SEND_SPACING);
        if budget_left && next < spec.stop {
            self.schedule_at(next, Event::Send { sender });
        }
    }

    fn handle_deliver(&mut self, flow: FlowId, sent_at: Duration, size: u32) {
        let now = self.clock;
        let record = self.records.entry(flow).or_default();
        record.rx_packets += 1;
        record.rx_bytes += size as u64;
        record.delay_sum += now.saturating_sub(sent_at);
        record.last_rx = now;
    }
}

impl Kernel for EventKernel {
    fn address_of(&self, node: usize) -> Ipv4Addr {
        node_address(node)
    }

    fn install_receiver(&mut self, node: usize, port: u16) {
        self.receivers.insert((node, port));
    }

    fn install_sender(&mut self, flow: &FlowSpec) {
        let index = self.senders.len();
        let source_port = SOURCE_PORT_BASE.wrapping_add(index as u16);
        let flow_id = FlowId {
            source: std::net::SocketAddrV4::new(node_address(flow.source), source_port),
            destination: flow.destination,
            protocol: UDP_PROTOCOL,
        };

        self.senders.push(SenderState {
            spec: flow.clone(),
            flow_id,
            sent: 0,
        });
        let start = flow.start;
        self.schedule_at(start, Event::Send { sender: index });
    }

    fn run(&mut self, until: Duration) -> Result<()> {
        while self.queue.peek().is_some_and(|event| event.at <= until) {
            let Some(scheduled) = self.queue.pop() else {
                break;
            };
            debug_assert!(scheduled.at >= self.clock, "clock must be monotonic");
            self.clock = scheduled.at;

            match scheduled.event {
                Event::Send { sender } => self.handle_send(sender),
                Event::Deliver { flow, sent_at, size } => {
                    self.handle_deliver(flow, sent_at, size)
                }
            }
        }

        self.clock = self.clock.max(until);
        self.ran = true;
        Ok(())
    }

    fn flow_stats(&self) -> Result<BTreeMap<FlowId, FlowRecord>> {
        if !self.ran {
            bail!("simulation kernel produced no flow records: run() never completed");
        }
        Ok(self.records.clone())
    }
}
