//! Current affinity state report.

use serde::Serialize;

use crate::{assign::QueueKind, error::Error, topology::Topology};

/// Raw mask currently configured for a single channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedMask {
    pub iface: String,
    pub channel: usize,
    pub irq: u32,
    pub hex: String,
}

/// Observed mask decoded and classified by NUMA node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub iface: String,
    pub channel: usize,
    pub irq: u32,
    pub numa0: Vec<usize>,
    pub numa1: Vec<usize>,
}

/// Decodes every observed mask, keeping the input order.
pub fn decode_rows(topology: &Topology, observed: &[ObservedMask]) -> Result<Vec<ReportRow>, Error> {
    let core_count = topology.core_count();

    let mut rows = Vec::with_capacity(observed.len());
    for mask in observed {
        let cores = cpumask::hex_to_cores(&mask.hex, core_count)?;
        if cores.last().is_some_and(|&core| core >= core_count) {
            log::warn!("{}: mask {} refers to cores outside the topology", mask.iface, mask.hex);
        }

        let split = topology.split_by_numa(&cores);
        rows.push(ReportRow {
            iface: mask.iface.clone(),
            channel: mask.channel,
            irq: mask.irq,
            numa0: split.numa0,
            numa1: split.numa1,
        });
    }

    Ok(rows)
}

/// Renders observed masks as a fixed-width, tab separated table.
///
/// RSS reports carry an IRQ column, RPS and XPS reports do not. The header
/// comes first, no trailing newline is emitted.
pub fn format_report(topology: &Topology, kind: QueueKind, observed: &[ObservedMask]) -> Result<String, Error> {
    let rows = decode_rows(topology, observed)?;

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(match kind {
        QueueKind::Rss => format!("{:>10}\t{:>3}\t{:>4}\t{:>20}\t{:>20}", "iface", "ch", "irq", "numa0", "numa1"),
        QueueKind::Rps | QueueKind::Xps => format!("{:>10}\t{:>3}\t{:>20}\t{:>20}", "iface", "ch", "numa0", "numa1"),
    });

    for row in &rows {
        let numa0 = join_cores(&row.numa0);
        let numa1 = join_cores(&row.numa1);
        lines.push(match kind {
            QueueKind::Rss => format!(
                "{:>10}\t{:>3}\t{:>4}\t{:>20}\t{:>20}",
                row.iface, row.channel, row.irq, numa0, numa1
            ),
            QueueKind::Rps | QueueKind::Xps => {
                format!("{:>10}\t{:>3}\t{:>20}\t{:>20}", row.iface, row.channel, numa0, numa1)
            }
        });
    }

    Ok(lines.join("\n"))
}

/// Comma-joins the cores, `-` for none.
pub fn join_cores(cores: &[usize]) -> String {
    if cores.is_empty() {
        return "-".to_owned();
    }

    cores.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}
