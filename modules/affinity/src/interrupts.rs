use std::collections::{BTreeMap, btree_map::Entry};

use serde::Serialize;

use crate::error::Error;

/// Network interface together with IRQ numbers of its channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetInterface {
    name: String,
    irqs: Vec<u32>,
}

impl NetInterface {
    /// Constructs an interface where `irqs[channel]` is the IRQ number of
    /// that channel.
    pub fn new(name: impl Into<String>, irqs: Vec<u32>) -> Self {
        Self { name: name.into(), irqs }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns IRQ numbers indexed by channel.
    #[inline]
    pub fn irqs(&self) -> &[u32] {
        &self.irqs
    }

    /// Returns the number of channels.
    #[inline]
    pub fn channels(&self) -> usize {
        self.irqs.len()
    }
}

/// Per-interface channel IRQs.
///
/// Interfaces are kept in first-seen order, which is also the order of
/// every plan and report derived from the table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterruptTable {
    ifaces: Vec<NetInterface>,
}

impl InterruptTable {
    #[inline]
    pub fn new(ifaces: Vec<NetInterface>) -> Self {
        Self { ifaces }
    }

    #[inline]
    pub fn builder() -> InterruptTableBuilder {
        InterruptTableBuilder::default()
    }

    #[inline]
    pub fn iter(&self) -> core::slice::Iter<'_, NetInterface> {
        self.ifaces.iter()
    }

    /// Returns interface names in first-seen order.
    pub fn ifaces(&self) -> impl Iterator<Item = &str> {
        self.ifaces.iter().map(NetInterface::name)
    }

    pub fn get(&self, name: &str) -> Option<&NetInterface> {
        self.ifaces.iter().find(|iface| iface.name == name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ifaces.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ifaces.is_empty()
    }
}

impl<'a> IntoIterator for &'a InterruptTable {
    type Item = &'a NetInterface;
    type IntoIter = core::slice::Iter<'a, NetInterface>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Collects `(interface, channel, irq)` observations into an
/// [`InterruptTable`].
///
/// Channels may arrive in any order, but every interface must end up with
/// a dense channel range starting from zero. A repeated channel is rejected
/// and the IRQ seen first is kept.
#[derive(Debug, Default)]
pub struct InterruptTableBuilder {
    ifaces: Vec<(String, BTreeMap<usize, u32>)>,
}

impl InterruptTableBuilder {
    pub fn insert(&mut self, iface: &str, channel: usize, irq: u32) -> Result<&mut Self, Error> {
        let idx = match self.ifaces.iter().position(|(name, _)| name == iface) {
            Some(idx) => idx,
            None => {
                self.ifaces.push((iface.to_owned(), BTreeMap::new()));
                self.ifaces.len() - 1
            }
        };

        let (_, channels) = &mut self.ifaces[idx];
        match channels.entry(channel) {
            Entry::Vacant(entry) => {
                entry.insert(irq);
            }
            Entry::Occupied(..) => {
                return Err(Error::DuplicateChannel {
                    iface: iface.to_owned(),
                    channel,
                });
            }
        }

        Ok(self)
    }

    pub fn build(self) -> Result<InterruptTable, Error> {
        let mut ifaces = Vec::with_capacity(self.ifaces.len());

        for (name, channels) in self.ifaces {
            let mut irqs = Vec::with_capacity(channels.len());
            for (expected, (channel, irq)) in channels.into_iter().enumerate() {
                if channel != expected {
                    return Err(Error::ChannelGap { iface: name, channel: expected });
                }
                irqs.push(irq);
            }

            ifaces.push(NetInterface { name, irqs });
        }

        Ok(InterruptTable { ifaces })
    }
}
