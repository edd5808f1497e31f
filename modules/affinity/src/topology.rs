use std::collections::BTreeMap;

use serde::Serialize;

use crate::{error::Error, numa::NumaSelector};

/// Per-core topology record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuInfo {
    /// NUMA node the core belongs to.
    pub numa_node: u32,
    /// Hex mask of thread siblings, as the kernel reports it.
    pub siblings_hex: String,
    /// Human-readable list of thread siblings, e.g. `"16,36"`.
    pub siblings_str: String,
}

impl CpuInfo {
    pub fn new(numa_node: u32, siblings_hex: impl Into<String>, siblings_str: impl Into<String>) -> Self {
        Self {
            numa_node,
            siblings_hex: siblings_hex.into(),
            siblings_str: siblings_str.into(),
        }
    }
}

/// CPU topology table, indexed by core.
///
/// Cores always form a dense range `0..N`, where `N` is the core count used
/// to pad every mask.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Topology {
    cpus: Vec<CpuInfo>,
}

/// Cores partitioned between NUMA node 0 and node 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NumaSplit {
    pub numa0: Vec<usize>,
    pub numa1: Vec<usize>,
}

impl Topology {
    /// Constructs a topology where `cpus[i]` describes core `i`.
    #[inline]
    pub fn new(cpus: Vec<CpuInfo>) -> Self {
        Self { cpus }
    }

    /// Constructs a topology from `(core, info)` pairs in any order.
    ///
    /// Fails if some core is described twice or if the cores do not form
    /// a dense range starting from zero.
    pub fn from_entries<I>(entries: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (usize, CpuInfo)>,
    {
        let mut map = BTreeMap::new();
        for (core, info) in entries {
            if map.insert(core, info).is_some() {
                return Err(Error::DuplicateCore(core));
            }
        }

        let mut cpus = Vec::with_capacity(map.len());
        for (expected, (core, info)) in map.into_iter().enumerate() {
            if core != expected {
                return Err(Error::SparseTopology { missing: expected });
            }
            cpus.push(info);
        }

        Ok(Self { cpus })
    }

    /// Returns the total number of cores.
    #[inline]
    pub fn core_count(&self) -> usize {
        self.cpus.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    #[inline]
    pub fn cpu(&self, core: usize) -> Option<&CpuInfo> {
        self.cpus.get(core)
    }

    /// Iterates over `(core, info)` pairs in ascending core order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &CpuInfo)> {
        self.cpus.iter().enumerate()
    }

    /// Returns the NUMA node of the given core.
    #[inline]
    pub fn numa_of(&self, core: usize) -> Option<u32> {
        self.cpus.get(core).map(|cpu| cpu.numa_node)
    }

    /// Returns NUMA nodes present in the topology, ascending.
    pub fn nodes(&self) -> Vec<u32> {
        let mut nodes: Vec<u32> = self.cpus.iter().map(|cpu| cpu.numa_node).collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// Returns all cores of the given NUMA node, ascending.
    pub fn cores_of_node(&self, node: u32) -> Vec<usize> {
        self.iter()
            .filter(|(_, cpu)| cpu.numa_node == node)
            .map(|(core, _)| core)
            .collect()
    }

    /// Partitions the given cores between NUMA node 0 and node 1.
    ///
    /// Relative order of the input is preserved. Cores that belong to
    /// neither node, or are unknown, are dropped.
    pub fn split_by_numa(&self, cores: &[usize]) -> NumaSplit {
        let mut split = NumaSplit::default();
        for &core in cores {
            match self.numa_of(core) {
                Some(0) => split.numa0.push(core),
                Some(1) => split.numa1.push(core),
                _ => {}
            }
        }

        split
    }

    /// Resolves a NUMA selector into an ordered list of candidate cores.
    ///
    /// [`NumaSelector::All`] yields cores of node 0 followed by cores of
    /// node 1, each node ascending. Cores of other nodes are never selected.
    pub fn select_cores(&self, selector: NumaSelector) -> Vec<usize> {
        match selector {
            NumaSelector::Node(node) => self.cores_of_node(node),
            NumaSelector::All => [self.cores_of_node(0), self.cores_of_node(1)].concat(),
        }
    }

    /// Returns thread siblings of the given core, decoded from its sibling
    /// mask.
    pub fn siblings(&self, core: usize) -> Result<Vec<usize>, Error> {
        let cpu = self.cpu(core).ok_or(Error::UnknownCore(core))?;
        Ok(cpumask::hex_to_cores(&cpu.siblings_hex, self.core_count())?)
    }
}
