use std::path::PathBuf;

use affinity::{NumaSelector, Policy};
use clap::{ArgAction, Parser, ValueEnum};

use crate::kernelfs::InterruptScanner;

/// Multi-queue NIC to CPU core affinity tuning.
///
/// Computes IRQ (RSS) and queue (RPS/XPS) affinity masks from the CPU
/// topology and prints shell commands that apply them. Nothing is written
/// to the kernel by this tool.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
#[command(flatten_help = true)]
pub struct Cmd {
    #[clap(subcommand)]
    pub mode: ModeCmd,
    /// Root of the sysfs tree.
    #[clap(long, env = "SYSFS", default_value = "/sys", global = true)]
    pub sysfs: PathBuf,
    /// Root of the procfs tree.
    #[clap(long, env = "PROCFS", default_value = "/proc", global = true)]
    pub procfs: PathBuf,
    /// Regular expression matching network interface names in the interrupt
    /// table.
    #[clap(long, default_value = InterruptScanner::DEFAULT_IFACE_PATTERN, global = true)]
    pub iface_pattern: String,
    /// Be verbose in terms of logging.
    #[clap(short, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Parser)]
pub enum ModeCmd {
    /// Show CPU topology grouped by NUMA node.
    Topology(TopologyCmd),
    /// Show current IRQ affinity of NIC channels.
    ShowRss(ShowCmd),
    /// Show current RPS CPU sets of NIC receive queues.
    ShowRps(ShowCmd),
    /// Show current XPS CPU sets of NIC transmit queues.
    ShowXps(ShowCmd),
    /// Print commands that pin NIC channel IRQs to cores.
    SetRss(SetCmd),
    /// Print commands that steer NIC receive queues to cores.
    SetRps(SetCmd),
    /// Print commands that steer NIC transmit queues to cores.
    SetXps(SetCmd),
}

#[derive(Debug, Clone, Parser)]
pub struct TopologyCmd {
    /// Output format.
    #[clap(long, value_enum, default_value_t = TopologyFormat::Tree)]
    pub format: TopologyFormat,
}

#[derive(Debug, Clone, Parser)]
pub struct ShowCmd {
    /// Output format.
    #[clap(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Parser)]
pub struct SetCmd {
    /// NUMA node to take cores from: 0, 1, or -1 (also "all") for both.
    #[arg(long, short, default_value = "0", allow_negative_numbers = true)]
    pub numa: NumaSelector,
    /// Give every channel all cores of the selected NUMA node instead of a
    /// single one.
    #[arg(long, short, conflicts_with = "siblings")]
    pub all_cores: bool,
    /// Give every channel the hyper-threading siblings of a single core.
    #[arg(long)]
    pub siblings: bool,
    /// Output format.
    #[clap(long, value_enum, default_value_t = PlanFormat::Shell)]
    pub format: PlanFormat,
}

impl SetCmd {
    pub fn policy(&self) -> Policy {
        if self.all_cores {
            Policy::AllCores
        } else if self.siblings {
            Policy::Siblings
        } else {
            Policy::PerCore
        }
    }
}

/// Topology output format options.
#[derive(Debug, Clone, ValueEnum)]
pub enum TopologyFormat {
    /// Tree structure (default).
    Tree,
    /// JSON format.
    Json,
}

/// Report output format options.
#[derive(Debug, Clone, ValueEnum)]
pub enum ReportFormat {
    /// Fixed-width tab separated columns (default).
    Text,
    /// Table with borders.
    Table,
    /// JSON format.
    Json,
}

/// Plan output format options.
#[derive(Debug, Clone, ValueEnum)]
pub enum PlanFormat {
    /// Shell script with `echo` commands (default).
    Shell,
    /// JSON format.
    Json,
}
