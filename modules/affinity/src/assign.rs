//! Round-robin distribution of candidate cores across queue slots.

use core::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::{error::Error, interrupts::NetInterface, topology::Topology};

/// Kind of per-queue kernel knob to steer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Receive Side Scaling: IRQ affinity of each channel.
    Rss,
    /// Receive Packet Steering: CPU set of each receive queue.
    Rps,
    /// Transmit Packet Steering: CPU set of each transmit queue.
    Xps,
}

impl QueueKind {
    /// Returns the kernel file steering the given channel.
    ///
    /// RSS is keyed by the IRQ number, RPS and XPS by the channel index.
    pub fn target_path(&self, iface: &str, channel: usize, irq: u32) -> String {
        match self {
            Self::Rss => format!("/proc/irq/{irq}/smp_affinity"),
            Self::Rps => format!("/sys/class/net/{iface}/queues/rx-{channel}/rps_cpus"),
            Self::Xps => format!("/sys/class/net/{iface}/queues/tx-{channel}/xps_cpus"),
        }
    }

    /// Returns target paths for every channel of the interface, in channel
    /// order.
    pub fn targets(&self, iface: &NetInterface) -> Vec<String> {
        iface
            .irqs()
            .iter()
            .enumerate()
            .map(|(channel, &irq)| self.target_path(iface.name(), channel, irq))
            .collect()
    }
}

impl Display for QueueKind {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        let name = match self {
            Self::Rss => "RSS",
            Self::Rps => "RPS",
            Self::Xps => "XPS",
        };

        write!(f, "{name}")
    }
}

/// How candidate cores are spread over queue slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Each slot gets exactly one core, cycling through the candidates.
    PerCore,
    /// Each slot gets the whole candidate set.
    AllCores,
    /// Each slot gets the thread siblings of one core, cycling through the
    /// candidates.
    Siblings,
}

/// Mask to be written into a single kernel file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub path: String,
    pub hex: String,
    pub cores: Vec<usize>,
}

/// Assignments of one interface, in channel order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfacePlan {
    pub iface: String,
    pub assignments: Vec<Assignment>,
}

/// Assignments of every interface, in interface first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AffinityPlan {
    pub ifaces: Vec<InterfacePlan>,
}

impl AffinityPlan {
    /// Looks up the assignment of the given interface and kernel path.
    pub fn get(&self, iface: &str, path: &str) -> Option<&Assignment> {
        self.ifaces
            .iter()
            .find(|plan| plan.iface == iface)?
            .assignments
            .iter()
            .find(|assignment| assignment.path == path)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ifaces.iter().all(|plan| plan.assignments.is_empty())
    }
}

/// Assigns each target a single core, taken from `cores` cyclically.
///
/// Target `i` gets `cores[i % cores.len()]`.
pub fn assign_per_core(cores: &[usize], targets: &[String], core_count: usize) -> Result<Vec<Assignment>, Error> {
    cycle(cores, targets, |core| Ok(vec![core]), core_count)
}

/// Assigns every target the same mask built from all `cores`.
pub fn assign_all_cores(cores: &[usize], targets: &[String], core_count: usize) -> Vec<Assignment> {
    let hex = cpumask::cores_to_hex(cores, core_count);

    targets
        .iter()
        .map(|path| Assignment {
            path: path.clone(),
            hex: hex.clone(),
            cores: cores.to_vec(),
        })
        .collect()
}

/// Assigns each target the thread siblings of a single core, taken from
/// `cores` cyclically.
pub fn assign_siblings(topology: &Topology, cores: &[usize], targets: &[String]) -> Result<Vec<Assignment>, Error> {
    cycle(cores, targets, |core| topology.siblings(core), topology.core_count())
}

fn cycle<F>(cores: &[usize], targets: &[String], mut expand: F, core_count: usize) -> Result<Vec<Assignment>, Error>
where
    F: FnMut(usize) -> Result<Vec<usize>, Error>,
{
    if cores.is_empty() {
        return Err(Error::EmptyCoreSet);
    }

    let mut assignments = Vec::with_capacity(targets.len());
    for (core, path) in cores.iter().cycle().zip(targets) {
        let cores = expand(*core)?;
        let hex = cpumask::cores_to_hex(&cores, core_count);
        log::debug!("{path} -> {hex} (cores {cores:?})");

        assignments.push(Assignment {
            path: path.clone(),
            hex,
            cores,
        });
    }

    Ok(assignments)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{self, CORE_COUNT};

    fn irq_targets(irqs: impl IntoIterator<Item = u32>) -> Vec<String> {
        irqs.into_iter()
            .map(|irq| QueueKind::Rss.target_path("eth0", 0, irq))
            .collect()
    }

    #[test]
    fn target_paths() {
        assert_eq!("/proc/irq/101/smp_affinity", QueueKind::Rss.target_path("enp2s0f0", 31, 101));
        assert_eq!(
            "/sys/class/net/enp2s0f0/queues/tx-31/xps_cpus",
            QueueKind::Xps.target_path("enp2s0f0", 31, 101)
        );
        assert_eq!(
            "/sys/class/net/enp2s0f0/queues/rx-0/rps_cpus",
            QueueKind::Rps.target_path("enp2s0f0", 0, 70)
        );
    }

    #[test]
    fn targets_follow_channel_order() {
        let iface = NetInterface::new("eth1", vec![40, 41]);

        assert_eq!(
            vec!["/sys/class/net/eth1/queues/tx-0/xps_cpus", "/sys/class/net/eth1/queues/tx-1/xps_cpus"],
            QueueKind::Xps.targets(&iface)
        );
        assert_eq!(
            vec!["/proc/irq/40/smp_affinity", "/proc/irq/41/smp_affinity"],
            QueueKind::Rss.targets(&iface)
        );
    }

    #[test]
    fn per_core_wraps_around() {
        let targets = irq_targets(0..5);
        let assignments = assign_per_core(&[3, 7], &targets, 8).unwrap();

        let cores: Vec<_> = assignments.iter().map(|a| a.cores.clone()).collect();
        assert_eq!(vec![vec![3], vec![7], vec![3], vec![7], vec![3]], cores);
        assert_eq!("08", assignments[0].hex);
        assert_eq!("80", assignments[1].hex);
    }

    #[test]
    fn per_core_single_candidate() {
        let targets = irq_targets(70..110);
        let assignments = assign_per_core(&[21], &targets, CORE_COUNT).unwrap();

        assert_eq!(40, assignments.len());
        for assignment in assignments {
            assert_eq!(vec![21], assignment.cores);
            assert_eq!("00,00200000", assignment.hex);
        }
    }

    #[test]
    fn per_core_fewer_slots_than_cores() {
        let targets = irq_targets([5]);
        let assignments = assign_per_core(&[9, 1, 2], &targets, 12).unwrap();

        assert_eq!(1, assignments.len());
        assert_eq!(vec![9], assignments[0].cores);
        assert_eq!("/proc/irq/5/smp_affinity", assignments[0].path);
    }

    #[test]
    fn per_core_requires_candidates() {
        assert_eq!(Err(Error::EmptyCoreSet), assign_per_core(&[], &irq_targets([1]), 8));
        assert_eq!(Err(Error::EmptyCoreSet), assign_per_core(&[], &[], 8));
    }

    #[test]
    fn all_cores_shares_one_mask() {
        let targets = irq_targets(70..73);
        let cores = testing::topology().cores_of_node(0);
        let assignments = assign_all_cores(&cores, &targets, CORE_COUNT);

        assert_eq!(3, assignments.len());
        for assignment in &assignments {
            assert_eq!("00,3ff003ff", assignment.hex);
            assert_eq!(cores, assignment.cores);
        }
    }

    #[test]
    fn all_cores_without_candidates_is_zero_mask() {
        let assignments = assign_all_cores(&[], &irq_targets([1]), CORE_COUNT);
        assert_eq!("00,00000000", assignments[0].hex);
        assert!(assignments[0].cores.is_empty());
    }

    #[test]
    fn siblings_cycle_through_candidates() {
        let topology = testing::topology();
        let targets = irq_targets(0..3);
        let assignments = assign_siblings(&topology, &[16, 4], &targets).unwrap();

        assert_eq!(vec![16, 36], assignments[0].cores);
        assert_eq!("10,00010000", assignments[0].hex);
        assert_eq!(vec![4, 24], assignments[1].cores);
        assert_eq!(vec![16, 36], assignments[2].cores);
    }

    #[test]
    fn siblings_require_candidates() {
        let topology = testing::topology();
        assert_eq!(Err(Error::EmptyCoreSet), assign_siblings(&topology, &[], &irq_targets([1])));
    }

    #[test]
    fn plan_lookup() {
        let plan = AffinityPlan {
            ifaces: vec![InterfacePlan {
                iface: "eth0".to_owned(),
                assignments: assign_per_core(&[1], &irq_targets([9]), 4).unwrap(),
            }],
        };

        assert_eq!("2", plan.get("eth0", "/proc/irq/9/smp_affinity").unwrap().hex);
        assert!(plan.get("eth0", "/proc/irq/10/smp_affinity").is_none());
        assert!(plan.get("eth1", "/proc/irq/9/smp_affinity").is_none());
        assert!(!plan.is_empty());
        assert!(AffinityPlan::default().is_empty());
    }
}
