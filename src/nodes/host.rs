//! End hosts.
//!
//! A [`Host`] has exactly one interface. It originates data packets with
//! [`Host::send`] and accepts the ones addressed to it with
//! [`Host::receive`]. Hosts never look at routing state; control packets
//! that reach a host are ignored.

use std::fmt;
use std::sync::Arc;

use crate::interface::{Block, Interface};
use crate::node::{Activation, DispatchError, Node, NodeCore, NodeKind, WaitMode};
use crate::packet::{Packet, PacketKind, WireFormat};
use crate::types::NodeAddress;

/// Callback invoked with every data packet a host accepts.
pub type ReceiveCallback = Box<dyn FnMut(&Packet) + Send>;

/// A network host.
///
/// # Example
///
/// ```
/// use dvnet::interface::Interface;
/// use dvnet::nodes::Host;
/// use dvnet::packet::WireFormat;
///
/// let iface = Interface::unbounded(1).shared();
/// let mut host = Host::new(1, iface.clone(), WireFormat::default());
///
/// host.send(3, "hello").unwrap();
/// assert_eq!(iface.outbound_len(), 1);
/// ```
pub struct Host {
    core: NodeCore,
    received: Vec<Packet>,
    on_receive: Option<ReceiveCallback>,
}

impl Host {
    /// Creates a host attached to `interface`.
    pub fn new(address: NodeAddress, interface: Arc<Interface>, wire: WireFormat) -> Self {
        Self {
            core: NodeCore::new(address, vec![interface], wire),
            received: Vec::new(),
            on_receive: None,
        }
    }

    /// Sets a callback to run for every accepted data packet.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&Packet) + Send + 'static,
    {
        self.on_receive = Some(Box::new(callback));
        self
    }

    /// Returns the host's only interface.
    pub fn interface(&self) -> &Arc<Interface> {
        &self.core.interfaces[0]
    }

    /// Sends `payload` to `destination`.
    ///
    /// The packet is queued without waiting; if the outbound queue is full
    /// it is dropped and the error returned. Nothing is retried.
    pub fn send(
        &mut self,
        destination: NodeAddress,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), DispatchError> {
        let packet = Packet::data(destination, self.core.address, payload);
        let bytes = self.core.wire.encode(&packet);

        match self.interface().enqueue_outbound(bytes, Block::No) {
            Ok(()) => {
                self.core.stats.packets_sent += 1;
                tracing::info!(host = self.core.address, "sending packet {}", packet);
                Ok(())
            }
            Err(err) => {
                let err = DispatchError::from(err);
                self.core.stats.record_drop(&err);
                tracing::warn!(host = self.core.address, error = %err, "packet {} not sent", packet);
                Err(err)
            }
        }
    }

    /// Pops one packet from the inbound queue.
    ///
    /// Returns the packet if it was application data; malformed and
    /// control packets are consumed and `None` is returned.
    pub fn receive(&mut self) -> Option<Packet> {
        let bytes = self.interface().try_receive()?;
        self.accept(&bytes)
    }

    /// Returns every data packet accepted so far, oldest first.
    pub fn received(&self) -> &[Packet] {
        &self.received
    }

    fn accept(&mut self, bytes: &[u8]) -> Option<Packet> {
        let packet = match self.core.wire.decode(bytes) {
            Ok(packet) => packet,
            Err(err) => {
                let err = DispatchError::from(err);
                self.core.stats.record_drop(&err);
                tracing::warn!(host = self.core.address, error = %err, "dropping packet");
                return None;
            }
        };

        if packet.kind == PacketKind::Control {
            tracing::trace!(host = self.core.address, "ignoring control packet");
            return None;
        }

        self.core.stats.packets_received += 1;
        tracing::info!(host = self.core.address, "received packet {}", packet);
        if let Some(callback) = self.on_receive.as_mut() {
            callback(&packet);
        }
        self.received.push(packet.clone());
        Some(packet)
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("address", &self.core.address)
            .field("received", &self.received.len())
            .finish()
    }
}

impl Node for Host {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Host
    }

    fn activate(&mut self, _wait: WaitMode<'_>) -> Activation {
        let mut activation = Activation::default();
        while let Some(bytes) = self.interface().try_receive() {
            activation.processed += 1;
            self.accept(&bytes);
        }
        activation
    }

    fn as_host(&self) -> Option<&Host> {
        Some(self)
    }

    fn as_host_mut(&mut self) -> Option<&mut Host> {
        Some(self)
    }
}
