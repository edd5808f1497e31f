//! Readers of the kernel pseudo-filesystems.
//!
//! Everything here only reads. Roots are configurable so that a snapshot of
//! `/sys` and `/proc` taken on another machine can be inspected as well.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use affinity::{CpuInfo, InterruptTable, ObservedMask, QueueKind, Topology};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: invalid value {value:?}")]
    Parse { path: PathBuf, value: String },
    #[error("no CPUs found under {0}")]
    NoCpus(PathBuf),
    #[error("cpu{core}: thread siblings mask {mask} does not match list {list:?}")]
    SiblingsMismatch { core: usize, mask: String, list: String },
    #[error("invalid interface pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error(transparent)]
    Affinity(#[from] affinity::Error),
}

/// Roots of the kernel pseudo-filesystems.
#[derive(Debug, Clone)]
pub struct KernelFs {
    sysfs: PathBuf,
    procfs: PathBuf,
}

impl KernelFs {
    pub fn new(sysfs: impl Into<PathBuf>, procfs: impl Into<PathBuf>) -> Self {
        Self {
            sysfs: sysfs.into(),
            procfs: procfs.into(),
        }
    }

    /// Reads the CPU topology from `{sysfs}/devices/system/cpu/cpuN/topology`.
    ///
    /// The physical package id is used as the NUMA node of a core.
    pub fn read_topology(&self) -> Result<Topology, Error> {
        let root = self.sysfs.join("devices/system/cpu");
        let re = Regex::new(r"^cpu(\d+)$")?;

        let mut entries = Vec::new();
        for entry in fs::read_dir(&root).map_err(|source| io_error(&root, source))? {
            let entry = entry.map_err(|source| io_error(&root, source))?;
            let name = entry.file_name();
            let Some(core) = name
                .to_str()
                .and_then(|name| re.captures(name))
                .and_then(|caps| caps[1].parse::<usize>().ok())
            else {
                continue;
            };

            let topology = entry.path().join("topology");
            let package_id = topology.join("physical_package_id");
            let numa_node = read_value(&package_id)?;
            let numa_node = numa_node.parse().map_err(|_| Error::Parse {
                path: package_id,
                value: numa_node,
            })?;

            let siblings_hex = read_value(&topology.join("thread_siblings"))?;
            let siblings_str = read_value(&topology.join("thread_siblings_list"))?;
            check_siblings(core, &topology, &siblings_hex, &siblings_str)?;

            let info = CpuInfo::new(numa_node, siblings_hex, siblings_str);
            log::trace!("cpu{core}: {info:?}");
            entries.push((core, info));
        }

        if entries.is_empty() {
            return Err(Error::NoCpus(root));
        }

        Ok(Topology::from_entries(entries)?)
    }

    /// Scans `{procfs}/interrupts` for NIC channel IRQs.
    pub fn scan_interrupts(&self, scanner: &InterruptScanner) -> Result<InterruptTable, Error> {
        let path = self.procfs.join("interrupts");
        let content = fs::read_to_string(&path).map_err(|source| io_error(&path, source))?;

        Ok(scanner.scan(&content)?)
    }

    /// Reads masks currently configured for every channel of every
    /// interface.
    pub fn observe(&self, kind: QueueKind, interrupts: &InterruptTable) -> Result<Vec<ObservedMask>, Error> {
        let mut observed = Vec::new();
        for iface in interrupts {
            for (channel, &irq) in iface.irqs().iter().enumerate() {
                let path = self.resolve(&kind.target_path(iface.name(), channel, irq));
                observed.push(ObservedMask {
                    iface: iface.name().to_owned(),
                    channel,
                    irq,
                    hex: read_value(&path)?,
                });
            }
        }

        Ok(observed)
    }

    /// Maps an absolute kernel path onto the configured roots.
    pub fn resolve(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("/proc/") {
            self.procfs.join(rest)
        } else if let Some(rest) = path.strip_prefix("/sys/") {
            self.sysfs.join(rest)
        } else {
            PathBuf::from(path)
        }
    }
}

/// Extracts `(irq, interface, channel)` triples from the interrupt table.
#[derive(Debug, Clone)]
pub struct InterruptScanner {
    re: Regex,
}

impl InterruptScanner {
    pub const DEFAULT_IFACE_PATTERN: &'static str = r"(?:en|eth)\w*";

    /// Constructs a scanner for interfaces whose names match the given
    /// pattern.
    ///
    /// A line matches when it has the form `IRQ: ... IFACE-...CHANNEL`,
    /// e.g. `70: 0 0 IR-PCI-MSI 1050624-edge enp2s0f0-TxRx-0`.
    pub fn new(iface_pattern: &str) -> Result<Self, Error> {
        let re = Regex::new(&format!(
            r"^\s*(?P<irq>\d+):.*?[\s-](?P<iface>{iface_pattern})-\S*?(?P<ch>\d+)\s*$"
        ))?;

        Ok(Self { re })
    }

    /// Builds the interrupt table out of `/proc/interrupts` content.
    ///
    /// Lines that do not match are skipped, as are repeated channels of an
    /// interface.
    pub fn scan(&self, content: &str) -> Result<InterruptTable, affinity::Error> {
        let mut builder = InterruptTable::builder();

        for line in content.lines() {
            let Some(caps) = self.re.captures(line) else {
                log::trace!("skipping interrupt line: {line:?}");
                continue;
            };

            let (Ok(irq), Ok(channel)) = (caps["irq"].parse::<u32>(), caps["ch"].parse::<usize>()) else {
                log::warn!("skipping interrupt line with out of range numbers: {line:?}");
                continue;
            };

            let iface = &caps["iface"];
            log::trace!("{iface}: channel {channel} -> IRQ {irq}");
            match builder.insert(iface, channel, irq) {
                Ok(..) => {}
                // Split rx/tx vectors report every channel twice, the first
                // IRQ wins.
                Err(affinity::Error::DuplicateChannel { .. }) => {
                    log::warn!("{iface}: channel {channel} is already bound, skipping IRQ {irq}");
                }
                Err(err) => return Err(err),
            }
        }

        builder.build()
    }
}

impl Default for InterruptScanner {
    fn default() -> Self {
        Self::new(Self::DEFAULT_IFACE_PATTERN).expect("default pattern must be valid")
    }
}

/// Ensures that the sibling mask and the sibling list describe the same
/// cores, and that the core is its own sibling.
fn check_siblings(core: usize, topology: &Path, mask: &str, list: &str) -> Result<(), Error> {
    let parse_error = |file: &str, value: &str| Error::Parse {
        path: topology.join(file),
        value: value.to_owned(),
    };

    let from_mask = cpumask::CpuMask::from_hex(mask).map_err(|_| parse_error("thread_siblings", mask))?;
    let from_list = cpumask::parse_list(list).map_err(|_| parse_error("thread_siblings_list", list))?;

    if from_mask.cores() != from_list || !from_mask.contains(core) {
        return Err(Error::SiblingsMismatch {
            core,
            mask: mask.to_owned(),
            list: list.to_owned(),
        });
    }

    Ok(())
}

fn read_value(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path)
        .map(|value| value.trim().to_owned())
        .map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: io::Error) -> Error {
    Error::Io {
        path: path.to_owned(),
        source,
    }
}

#[cfg(test)]
mod test {
    use std::fmt::Write;

    use affinity::NumaSelector;
    use tempfile::TempDir;

    use super::*;

    const CORE_COUNT: usize = 40;

    fn interrupts_10g() -> String {
        let mut content = String::from("            CPU0       CPU1       CPU2       CPU3\n");
        content.push_str("   0:         37          0          0          0  IR-IO-APIC    2-edge      timer\n");
        content.push_str("  24:          0          0          0          0  IR-PCI-MSI 65536-edge      nvme0q0\n");
        for (iface, base, msi) in [("enp2s0f0", 70, 1050624), ("enp2s0f1", 112, 1052672)] {
            for ch in 0..40 {
                writeln!(
                    content,
                    "{:>4}:        {}          0          0          0  IR-PCI-MSI {}-edge      {iface}-TxRx-{ch}",
                    base + ch,
                    ch * 7,
                    msi + ch,
                )
                .unwrap();
            }
            writeln!(content, "{:>4}:          1          0          0          0  IR-PCI-MSI {}-edge      {iface}", base + 40, msi + 40)
                .unwrap();
        }
        content.push_str(" NMI:          0          0          0          0   Non-maskable interrupts\n");
        content
    }

    fn write(path: &Path, value: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("{value}\n")).unwrap();
    }

    fn fake_sysfs() -> TempDir {
        let dir = TempDir::new().unwrap();
        let cpu = dir.path().join("devices/system/cpu");

        for core in 0..CORE_COUNT {
            let siblings = [core % 20, core % 20 + 20];
            let topology = cpu.join(format!("cpu{core}/topology"));
            write(&topology.join("physical_package_id"), &((core % 20) / 10).to_string());
            write(&topology.join("thread_siblings"), &cpumask::cores_to_hex(&siblings, CORE_COUNT));
            write(&topology.join("thread_siblings_list"), &format!("{},{}", siblings[0], siblings[1]));
        }
        fs::create_dir_all(cpu.join("cpufreq")).unwrap();
        fs::create_dir_all(cpu.join("cpuidle")).unwrap();
        write(&cpu.join("online"), "0-39");

        dir
    }

    #[test]
    fn scan_10g_interrupts() {
        let table = InterruptScanner::default().scan(&interrupts_10g()).unwrap();

        assert_eq!(vec!["enp2s0f0", "enp2s0f1"], table.ifaces().collect::<Vec<_>>());
        assert_eq!(40, table.get("enp2s0f0").unwrap().channels());
        assert_eq!(40, table.get("enp2s0f1").unwrap().channels());
        assert_eq!(109, table.get("enp2s0f0").unwrap().irqs()[39]);
        assert_eq!(151, table.get("enp2s0f1").unwrap().irqs()[39]);
        assert_eq!(101, table.get("enp2s0f0").unwrap().irqs()[31]);
    }

    #[test]
    fn scan_driver_prefixed_names() {
        let content = "\
 150:          0          0  IR-PCI-MSI 1572864-edge      i40e-ens1f0-TxRx-0
 151:          0          0  IR-PCI-MSI 1572865-edge      i40e-ens1f0-TxRx-1
 152:          0          0  IR-PCI-MSI 1572866-edge      i40e-ens1f0-TxRx-2
";
        let table = InterruptScanner::default().scan(content).unwrap();
        assert_eq!(&[150, 151, 152], table.get("ens1f0").unwrap().irqs());
    }

    #[test]
    fn scan_custom_pattern() {
        let scanner = InterruptScanner::new(r"enp2s0f1").unwrap();
        let table = scanner.scan(&interrupts_10g()).unwrap();

        assert_eq!(vec!["enp2s0f1"], table.ifaces().collect::<Vec<_>>());
    }

    #[test]
    fn scan_split_rx_tx_vectors() {
        let content = "\
  30:   0  IR-PCI-MSI 524288-edge      eth0-rx-0
  31:   0  IR-PCI-MSI 524289-edge      eth0-rx-1
  32:   0  IR-PCI-MSI 524290-edge      eth0-tx-0
  33:   0  IR-PCI-MSI 524291-edge      eth0-tx-1
  34:   0  IR-PCI-MSI 524292-edge      eth0
";
        let table = InterruptScanner::default().scan(content).unwrap();

        assert_eq!(1, table.len());
        assert_eq!(&[30, 31], table.get("eth0").unwrap().irqs());
    }

    #[test]
    fn scan_reports_gaps() {
        let content = "\
  70:   0  IR-PCI-MSI 1050624-edge      eth0-TxRx-0
  72:   0  IR-PCI-MSI 1050626-edge      eth0-TxRx-2
";
        assert!(matches!(
            InterruptScanner::default().scan(content),
            Err(affinity::Error::ChannelGap { channel: 1, .. })
        ));
    }

    #[test]
    fn invalid_pattern() {
        assert!(matches!(InterruptScanner::new("(unclosed"), Err(Error::Pattern(..))));
    }

    #[test]
    fn read_topology_from_sysfs() {
        let sysfs = fake_sysfs();
        let kfs = KernelFs::new(sysfs.path(), "/nonexistent");

        let topology = kfs.read_topology().unwrap();

        assert_eq!(CORE_COUNT, topology.core_count());
        assert_eq!(
            &CpuInfo::new(1, "10,00010000", "16,36"),
            topology.cpu(16).unwrap()
        );
        assert_eq!(20, topology.cores_of_node(0).len());
        assert_eq!(
            vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29],
            topology.select_cores(NumaSelector::NODE0)
        );
    }

    #[test]
    fn read_topology_missing_root() {
        let kfs = KernelFs::new("/nonexistent/sys", "/nonexistent/proc");
        assert!(matches!(kfs.read_topology(), Err(Error::Io { .. })));
    }

    #[test]
    fn read_topology_without_cpus() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("devices/system/cpu/cpufreq")).unwrap();

        let kfs = KernelFs::new(dir.path(), "/nonexistent");
        assert!(matches!(kfs.read_topology(), Err(Error::NoCpus(..))));
    }

    #[test]
    fn read_topology_bad_package_id() {
        let dir = TempDir::new().unwrap();
        let topology = dir.path().join("devices/system/cpu/cpu0/topology");
        write(&topology.join("physical_package_id"), "zero");
        write(&topology.join("thread_siblings"), "1");
        write(&topology.join("thread_siblings_list"), "0");

        let kfs = KernelFs::new(dir.path(), "/nonexistent");
        assert!(matches!(kfs.read_topology(), Err(Error::Parse { value, .. }) if value == "zero"));
    }

    #[test]
    fn read_topology_inconsistent_siblings() {
        let sysfs = fake_sysfs();
        let topology = sysfs.path().join("devices/system/cpu/cpu7/topology");
        write(&topology.join("thread_siblings_list"), "7,28");

        let kfs = KernelFs::new(sysfs.path(), "/nonexistent");
        assert!(matches!(
            kfs.read_topology(),
            Err(Error::SiblingsMismatch { core: 7, list, .. }) if list == "7,28"
        ));
    }

    #[test]
    fn read_topology_bad_siblings_list() {
        let sysfs = fake_sysfs();
        let topology = sysfs.path().join("devices/system/cpu/cpu3/topology");
        write(&topology.join("thread_siblings_list"), "3-");

        let kfs = KernelFs::new(sysfs.path(), "/nonexistent");
        assert!(matches!(kfs.read_topology(), Err(Error::Parse { value, .. }) if value == "3-"));
    }

    #[test]
    fn scan_interrupts_from_procfs() {
        let procfs = TempDir::new().unwrap();
        write(&procfs.path().join("interrupts"), &interrupts_10g());

        let kfs = KernelFs::new("/nonexistent", procfs.path());
        let table = kfs.scan_interrupts(&InterruptScanner::default()).unwrap();

        assert_eq!(2, table.len());
    }

    #[test]
    fn observe_reads_current_masks() {
        let sysfs = TempDir::new().unwrap();
        let procfs = TempDir::new().unwrap();
        let table = InterruptTable::new(vec![affinity::NetInterface::new("eth0", vec![30, 31])]);

        write(&procfs.path().join("irq/30/smp_affinity"), "00,00000001");
        write(&procfs.path().join("irq/31/smp_affinity"), "00,00000400");
        write(&sysfs.path().join("class/net/eth0/queues/tx-0/xps_cpus"), "00,00000000");
        write(&sysfs.path().join("class/net/eth0/queues/tx-1/xps_cpus"), "ff,ffffffff");

        let kfs = KernelFs::new(sysfs.path(), procfs.path());

        let rss = kfs.observe(QueueKind::Rss, &table).unwrap();
        assert_eq!(
            vec!["00,00000001", "00,00000400"],
            rss.iter().map(|m| m.hex.as_str()).collect::<Vec<_>>()
        );
        assert_eq!(31, rss[1].irq);

        let xps = kfs.observe(QueueKind::Xps, &table).unwrap();
        assert_eq!("ff,ffffffff", xps[1].hex);
        assert_eq!(1, xps[1].channel);

        assert!(matches!(kfs.observe(QueueKind::Rps, &table), Err(Error::Io { .. })));
    }

    #[test]
    fn resolve_maps_roots() {
        let kfs = KernelFs::new("/snap/sys", "/snap/proc");

        assert_eq!(PathBuf::from("/snap/proc/irq/5/smp_affinity"), kfs.resolve("/proc/irq/5/smp_affinity"));
        assert_eq!(
            PathBuf::from("/snap/sys/class/net/eth0/queues/rx-0/rps_cpus"),
            kfs.resolve("/sys/class/net/eth0/queues/rx-0/rps_cpus")
        );
        assert_eq!(PathBuf::from("/dev/null"), kfs.resolve("/dev/null"));
    }
}
