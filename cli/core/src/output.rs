//! Output renderers: shell scripts, tables, trees and JSON.

use core::error::Error;
use std::fmt::Write;

use affinity::{report, AffinityPlan, QueueKind, ReportRow, Topology};
use ptree::TreeBuilder;
use serde::Serialize;
use tabled::{
    settings::{
        object::{Columns, Rows},
        style::{BorderColor, HorizontalLine},
        Color, Style,
    },
    Table, Tabled,
};

/// Renders the plan as a shell script, one `echo` per kernel file.
pub fn render_shell(kind: QueueKind, plan: &AffinityPlan) -> String {
    let mut script = String::new();

    for iface in &plan.ifaces {
        _ = writeln!(script, "# setting up {kind} for {}", iface.iface);
        for assignment in &iface.assignments {
            _ = writeln!(script, "# {} to cores {}", iface.iface, report::join_cores(&assignment.cores));
            _ = writeln!(script, "echo {} > {}", assignment.hex, assignment.path);
        }
    }

    script
}

pub fn render_json<T>(value: &T) -> Result<String, Box<dyn Error>>
where
    T: Serialize + ?Sized,
{
    Ok(serde_json::to_string_pretty(value)?)
}

#[derive(Tabled)]
struct ReportTableRow {
    #[tabled(rename = "Interface")]
    iface: String,
    #[tabled(rename = "Channel")]
    channel: usize,
    #[tabled(rename = "IRQ")]
    irq: u32,
    #[tabled(rename = "NUMA 0")]
    numa0: String,
    #[tabled(rename = "NUMA 1")]
    numa1: String,
}

/// Renders decoded report rows as a bordered table.
pub fn render_table(rows: &[ReportRow]) -> String {
    let rows = rows.iter().map(|row| ReportTableRow {
        iface: row.iface.clone(),
        channel: row.channel,
        irq: row.irq,
        numa0: report::join_cores(&row.numa0),
        numa1: report::join_cores(&row.numa1),
    });

    let mut table = Table::new(rows);
    table.with(
        Style::modern()
            .horizontals([(1, HorizontalLine::inherit(Style::modern()))])
            .remove_horizontal(),
    );
    table.modify(Columns::new(..), BorderColor::filled(Color::rgb_fg(0x4e, 0x4e, 0x4e)));
    table.modify(Rows::first(), Color::BOLD);

    table.to_string()
}

/// Renders the topology as a NUMA node -> core tree.
pub fn render_topology_tree(topology: &Topology) -> Result<String, Box<dyn Error>> {
    let mut tree = TreeBuilder::new(format!("CPU topology ({} cores)", topology.core_count()));

    for node in topology.nodes() {
        let cores = topology.cores_of_node(node);
        let mask = cpumask::CpuMask::from_cores(cores.iter().copied(), topology.core_count());

        tree.begin_child(format!("NUMA {node}: {mask} [{}]", mask.to_hex(topology.core_count())));
        for core in cores {
            let Some(cpu) = topology.cpu(core) else {
                continue;
            };
            tree.add_empty_child(format!("cpu{core}: siblings {} [{}]", cpu.siblings_str, cpu.siblings_hex));
        }
        tree.end_child();
    }

    let tree = tree.build();
    let mut buf = Vec::new();
    ptree::write_tree(&tree, &mut buf)?;

    Ok(String::from_utf8(buf)?)
}
