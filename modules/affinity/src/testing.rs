//! Shared fixtures: a two-socket machine with 40 cores, hyper-threading
//! siblings `c` and `c + 20`, and two 40-channel 10G interfaces.

use crate::{
    interrupts::{InterruptTable, NetInterface},
    topology::{CpuInfo, Topology},
};

pub const CORE_COUNT: usize = 40;

/// Node 0 owns cores `0-9,20-29`, node 1 owns `10-19,30-39`.
pub fn topology() -> Topology {
    let cpus = (0..CORE_COUNT)
        .map(|core| {
            let numa_node = ((core % 20) / 10) as u32;
            let siblings = [core % 20, core % 20 + 20];
            CpuInfo::new(
                numa_node,
                cpumask::cores_to_hex(&siblings, CORE_COUNT),
                format!("{},{}", siblings[0], siblings[1]),
            )
        })
        .collect();

    Topology::new(cpus)
}

/// `enp2s0f0` channels 0..40 are IRQs 70..110, `enp2s0f1` are 112..152.
pub fn interrupts() -> InterruptTable {
    InterruptTable::new(vec![
        NetInterface::new("enp2s0f0", (70..110).collect()),
        NetInterface::new("enp2s0f1", (112..152).collect()),
    ])
}
