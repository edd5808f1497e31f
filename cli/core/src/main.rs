//! `rxtune`: multi-queue NIC to CPU core affinity tuning.

use core::error::Error;
use std::sync::LazyLock;

use affinity::{Context, InterruptTable, QueueKind};
use clap::{CommandFactory, Parser};
use clap_complete::CompleteEnv;
use colored::{ColoredString, Colorize};
use rxtune::{
    args::{Cmd, ModeCmd, PlanFormat, ReportFormat, SetCmd, ShowCmd, TopologyCmd, TopologyFormat},
    kernelfs::{InterruptScanner, KernelFs},
    logging, output,
};

static ERROR: LazyLock<ColoredString> = LazyLock::new(|| "error".bold().bright_red());

pub fn main() {
    CompleteEnv::with_factory(Cmd::command).complete();

    let cmd = Cmd::parse();
    logging::init(cmd.verbose as usize).expect("no error expected");

    if let Err(err) = run(cmd) {
        log::error!("{}: {err}", *ERROR);
        std::process::exit(1);
    }
}

fn run(cmd: Cmd) -> Result<(), Box<dyn Error>> {
    let kfs = KernelFs::new(&cmd.sysfs, &cmd.procfs);

    match cmd.mode {
        ModeCmd::Topology(sub) => show_topology(&kfs, sub),
        ModeCmd::ShowRss(sub) => show(&kfs, &cmd.iface_pattern, QueueKind::Rss, sub),
        ModeCmd::ShowRps(sub) => show(&kfs, &cmd.iface_pattern, QueueKind::Rps, sub),
        ModeCmd::ShowXps(sub) => show(&kfs, &cmd.iface_pattern, QueueKind::Xps, sub),
        ModeCmd::SetRss(sub) => set(&kfs, &cmd.iface_pattern, QueueKind::Rss, sub),
        ModeCmd::SetRps(sub) => set(&kfs, &cmd.iface_pattern, QueueKind::Rps, sub),
        ModeCmd::SetXps(sub) => set(&kfs, &cmd.iface_pattern, QueueKind::Xps, sub),
    }
}

fn context(kfs: &KernelFs, iface_pattern: &str) -> Result<Context, Box<dyn Error>> {
    let topology = kfs.read_topology()?;
    let interrupts = kfs.scan_interrupts(&InterruptScanner::new(iface_pattern)?)?;
    log::debug!(
        "{} cores on NUMA nodes {:?}, interfaces {:?}",
        topology.core_count(),
        topology.nodes(),
        interrupts.ifaces().collect::<Vec<_>>()
    );

    if interrupts.is_empty() {
        log::warn!("no network interface matching {iface_pattern:?} found in the interrupt table");
    }

    Ok(Context::new(topology, interrupts))
}

fn show_topology(kfs: &KernelFs, cmd: TopologyCmd) -> Result<(), Box<dyn Error>> {
    let topology = kfs.read_topology()?;

    match cmd.format {
        TopologyFormat::Tree => print!("{}", output::render_topology_tree(&topology)?),
        TopologyFormat::Json => println!("{}", output::render_json(&topology)?),
    }

    Ok(())
}

fn show(kfs: &KernelFs, iface_pattern: &str, kind: QueueKind, cmd: ShowCmd) -> Result<(), Box<dyn Error>> {
    let ctx = context(kfs, iface_pattern)?;
    let observed = kfs.observe(kind, ctx.interrupts())?;

    match cmd.format {
        ReportFormat::Text => println!("{}", ctx.report(kind, &observed)?),
        ReportFormat::Table => println!("{}", output::render_table(&ctx.decode(&observed)?)),
        ReportFormat::Json => println!("{}", output::render_json(&ctx.decode(&observed)?)?),
    }

    Ok(())
}

fn set(kfs: &KernelFs, iface_pattern: &str, kind: QueueKind, cmd: SetCmd) -> Result<(), Box<dyn Error>> {
    let ctx = context(kfs, iface_pattern)?;
    let policy = cmd.policy();

    let cores = ctx.topology().select_cores(cmd.numa);
    if cores.is_empty() {
        return Err(format!("NUMA {} has no cores to assign", cmd.numa).into());
    }
    log::info!(
        "assigning {kind} of {} with {policy:?} policy on cores {}",
        describe(ctx.interrupts()),
        cpumask::CpuMask::from_cores(cores.iter().copied(), ctx.topology().core_count())
    );

    let plan = ctx.plan(kind, policy, cmd.numa)?;

    match cmd.format {
        PlanFormat::Shell => print!("{}", output::render_shell(kind, &plan)),
        PlanFormat::Json => println!("{}", output::render_json(&plan)?),
    }

    Ok(())
}

fn describe(interrupts: &InterruptTable) -> String {
    let ifaces: Vec<String> = interrupts
        .iter()
        .map(|iface| format!("{} ({} channels)", iface.name().yellow(), iface.channels()))
        .collect();

    ifaces.join(", ")
}
