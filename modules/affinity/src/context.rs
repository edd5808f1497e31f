use crate::{
    assign::{self, AffinityPlan, Assignment, InterfacePlan, Policy, QueueKind},
    error::Error,
    interrupts::InterruptTable,
    numa::NumaSelector,
    report::{self, ObservedMask, ReportRow},
    topology::Topology,
};

/// Snapshot of the machine the engine works against.
///
/// Built once per invocation from freshly scanned tables and never mutated.
/// Every computation is a pure function of the context and its arguments.
#[derive(Debug, Clone, Default)]
pub struct Context {
    topology: Topology,
    interrupts: InterruptTable,
}

impl Context {
    pub fn new(topology: Topology, interrupts: InterruptTable) -> Self {
        Self { topology, interrupts }
    }

    #[inline]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    #[inline]
    pub fn interrupts(&self) -> &InterruptTable {
        &self.interrupts
    }

    /// Computes the assignment plan of the given queue kind for every
    /// interface.
    ///
    /// Either every interface is planned or an error is returned, a plan is
    /// never partially filled. The cycling policies fail on an empty
    /// candidate set even when there is nothing to plan.
    pub fn plan(&self, kind: QueueKind, policy: Policy, selector: NumaSelector) -> Result<AffinityPlan, Error> {
        let cores = self.topology.select_cores(selector);
        let core_count = self.topology.core_count();
        log::debug!("{kind} {policy:?} on NUMA {selector}: candidate cores {cores:?}");

        if cores.is_empty() && matches!(policy, Policy::PerCore | Policy::Siblings) {
            return Err(Error::EmptyCoreSet);
        }

        let mut plan = AffinityPlan::default();
        for iface in &self.interrupts {
            let targets = kind.targets(iface);
            let assignments: Vec<Assignment> = match policy {
                Policy::PerCore => assign::assign_per_core(&cores, &targets, core_count)?,
                Policy::AllCores => assign::assign_all_cores(&cores, &targets, core_count),
                Policy::Siblings => assign::assign_siblings(&self.topology, &cores, &targets)?,
            };

            plan.ifaces.push(InterfacePlan {
                iface: iface.name().to_owned(),
                assignments,
            });
        }

        Ok(plan)
    }

    pub fn enable_rss_per_core(&self, selector: NumaSelector) -> Result<AffinityPlan, Error> {
        self.plan(QueueKind::Rss, Policy::PerCore, selector)
    }

    pub fn enable_rss_all_cores(&self, selector: NumaSelector) -> AffinityPlan {
        self.all_cores(QueueKind::Rss, selector)
    }

    pub fn enable_xps_per_core(&self, selector: NumaSelector) -> Result<AffinityPlan, Error> {
        self.plan(QueueKind::Xps, Policy::PerCore, selector)
    }

    pub fn enable_xps_all_cores(&self, selector: NumaSelector) -> AffinityPlan {
        self.all_cores(QueueKind::Xps, selector)
    }

    pub fn enable_rps_per_core(&self, selector: NumaSelector) -> Result<AffinityPlan, Error> {
        self.plan(QueueKind::Rps, Policy::PerCore, selector)
    }

    pub fn enable_rps_all_cores(&self, selector: NumaSelector) -> AffinityPlan {
        self.all_cores(QueueKind::Rps, selector)
    }

    /// Decodes observed masks into NUMA classified rows.
    pub fn decode(&self, observed: &[ObservedMask]) -> Result<Vec<ReportRow>, Error> {
        report::decode_rows(&self.topology, observed)
    }

    /// Renders observed masks of the given queue kind as a fixed-width
    /// report.
    pub fn report(&self, kind: QueueKind, observed: &[ObservedMask]) -> Result<String, Error> {
        report::format_report(&self.topology, kind, observed)
    }

    fn all_cores(&self, kind: QueueKind, selector: NumaSelector) -> AffinityPlan {
        let cores = self.topology.select_cores(selector);
        let core_count = self.topology.core_count();

        let ifaces = self
            .interrupts
            .iter()
            .map(|iface| InterfacePlan {
                iface: iface.name().to_owned(),
                assignments: assign::assign_all_cores(&cores, &kind.targets(iface), core_count),
            })
            .collect();

        AffinityPlan { ifaces }
    }
}
