//! Nogood exchange between cooperating hosts.
//!
//! A [`Collective`] ties together the hosts taking part in one solve:
//! at every restart round boundary, the first worker on each host
//! gathers everyone's freshly learned nogoods and contributes them to
//! an all-to-all exchange, so that each host ends up watching the
//! union. [`SingleHost`] is the trivial one-member collective;
//! [`ChannelCluster`] wires several solver instances in one process
//! together over channels, which is also how the cross-host protocol
//! is tested.

use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::nogoods::Assignment;

/// One learned nogood in transit between hosts. Opaque to callers;
/// produced and consumed by the solver.
#[derive(Clone, Debug)]
pub struct NogoodMessage(pub(crate) Vec<Assignment>);

/// A group of hosts cooperating on one solve.
///
/// `all_gather` must behave collectively: every member calls it once
/// per round, and each call returns every member's batch, in rank
/// order. Only one thread per host calls it.
pub trait Collective: Send + Sync {
    /// This host's position in the collective.
    fn rank(&self) -> usize;

    /// Number of cooperating hosts.
    fn size(&self) -> usize;

    /// Contribute `local` and collect every host's batch, own batch
    /// included, indexed by rank.
    fn all_gather(&self, local: Vec<NogoodMessage>) -> Vec<Vec<NogoodMessage>>;
}

/// The degenerate collective: one host, gathers are identity.
pub struct SingleHost;

impl Collective for SingleHost {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather(&self, local: Vec<NogoodMessage>) -> Vec<Vec<NogoodMessage>> {
        vec![local]
    }
}

type Batch = Vec<NogoodMessage>;

/// A fully connected group of in-process hosts exchanging over
/// channels. Build one handle per host with [`ChannelCluster::build`]
/// and run each host's solve on its own thread.
pub struct ChannelCluster {
    rank: usize,
    size: usize,
    /// senders[j] sends to host j; the self slot is unused.
    senders: Vec<Sender<Batch>>,
    /// receivers[i] receives from host i. Receivers are not `Sync`,
    /// but the collective handle must be, hence the mutexes.
    receivers: Vec<Mutex<Receiver<Batch>>>,
}

impl ChannelCluster {
    /// Wire up `size` fully connected hosts and hand back one handle
    /// per rank.
    pub fn build(size: usize) -> Vec<ChannelCluster> {
        let mut senders: Vec<Vec<Sender<Batch>>> = (0..size).map(|_| Vec::new()).collect();
        let mut receivers: Vec<Vec<Mutex<Receiver<Batch>>>> =
            (0..size).map(|_| Vec::new()).collect();

        for from in 0..size {
            for to in 0..size {
                let (tx, rx) = mpsc::channel();
                senders[from].push(tx);
                receivers[to].push(Mutex::new(rx));
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| ChannelCluster { rank, size, senders, receivers })
            .collect()
    }
}

impl Collective for ChannelCluster {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_gather(&self, local: Vec<NogoodMessage>) -> Vec<Vec<NogoodMessage>> {
        // send to everyone first; channels are unbounded so this
        // cannot deadlock. a hung-up peer has already finished, and
        // whatever we fail to tell it no longer matters.
        for (peer, tx) in self.senders.iter().enumerate() {
            if peer != self.rank {
                let _ = tx.send(local.clone());
            }
        }

        (0..self.size)
            .map(|peer| {
                if peer == self.rank {
                    local.clone()
                } else {
                    self.receivers[peer]
                        .lock()
                        .map(|rx| rx.recv().unwrap_or_default())
                        .unwrap_or_default()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn message(p: u32, t: u32) -> NogoodMessage {
        NogoodMessage(vec![Assignment { pattern_vertex: p, target_vertex: t }])
    }

    #[test]
    fn single_host_gather_is_identity() {
        let host = SingleHost;
        let gathered = host.all_gather(vec![message(0, 1)]);
        assert_eq!(gathered.len(), 1);
        assert_eq!(gathered[0].len(), 1);
        assert_eq!(gathered[0][0].0[0].target_vertex, 1);
    }

    #[test]
    fn channel_cluster_gathers_in_rank_order() {
        let hosts = ChannelCluster::build(3);
        let handles: Vec<_> = hosts
            .into_iter()
            .map(|host| {
                thread::spawn(move || {
                    let rank = host.rank() as u32;
                    let gathered = host.all_gather(vec![message(rank, rank)]);
                    (rank, gathered)
                })
            })
            .collect();

        for handle in handles {
            let (_, gathered) = handle.join().expect("host thread panicked");
            assert_eq!(gathered.len(), 3);
            for (peer, batch) in gathered.iter().enumerate() {
                assert_eq!(batch.len(), 1);
                assert_eq!(batch[0].0[0].pattern_vertex, peer as u32);
            }
        }
    }

    #[test]
    fn gather_survives_a_departed_peer() {
        let mut hosts = ChannelCluster::build(2);
        let second = hosts.pop().expect("two hosts built");
        drop(hosts);

        let gathered = second.all_gather(vec![message(1, 1)]);
        assert_eq!(gathered.len(), 2);
        assert!(gathered[0].is_empty(), "gone peer contributes nothing");
        assert_eq!(gathered[1].len(), 1);
    }

    #[test]
    fn repeated_rounds_stay_aligned() {
        let hosts = ChannelCluster::build(2);
        let handles: Vec<_> = hosts
            .into_iter()
            .map(|host| {
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    for round in 0..4u32 {
                        let gathered = host.all_gather(vec![message(round, host.rank() as u32)]);
                        seen.push(gathered);
                    }
                    seen
                })
            })
            .collect();

        for handle in handles {
            let rounds = handle.join().expect("host thread panicked");
            for (round, gathered) in rounds.iter().enumerate() {
                for batch in gathered {
                    assert_eq!(batch[0].0[0].pattern_vertex, round as u32);
                }
            }
        }
    }
}
