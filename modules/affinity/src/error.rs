use cpumask::FormatError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("no candidate cores to assign")]
    EmptyCoreSet,
    #[error("invalid NUMA selector {0:?}: expected 0, 1, -1 or \"all\"")]
    InvalidSelector(String),
    #[error("core {0} is not present in the topology")]
    UnknownCore(usize),
    #[error("core {0} is described twice")]
    DuplicateCore(usize),
    #[error("topology is not dense: core {missing} is missing")]
    SparseTopology { missing: usize },
    #[error("interface {iface}: channel {channel} is missing")]
    ChannelGap { iface: String, channel: usize },
    #[error("interface {iface}: channel {channel} is seen twice")]
    DuplicateChannel { iface: String, channel: usize },
}
