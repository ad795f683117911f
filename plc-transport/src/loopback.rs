//! In-process loopback transport
//!
//! The far end of a loopback transport is a `LoopbackPeer` held by the
//! caller. The peer sees every message the transport sends and can answer
//! with scripted bytes, either pushed by hand or produced by a responder
//! closure. Answers can be held back for a number of receive attempts to
//! mimic a device that takes a few polling rounds to reply.

use crate::error::{PlcError, PlcResult};
use crate::frame::FrameAccumulator;
use crate::transport::{Parameters, Transport, TransportFactory};
use log::{debug, trace};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::rc::Rc;

/// Produces the peer's answer to one sent message, if any
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>>>;

#[derive(Default)]
struct PeerState {
    sent: Vec<Vec<u8>>,
    /// Answers waiting to be delivered, with their remaining delay
    pending: VecDeque<(u32, Vec<u8>)>,
    responder: Option<Responder>,
    response_delay: u32,
    open_count: u32,
    close_count: u32,
}

/// Caller-side end of one or more loopback transports
///
/// Cloning yields another handle onto the same peer.
#[derive(Clone, Default)]
pub struct LoopbackPeer {
    state: Rc<RefCell<PeerState>>,
}

impl fmt::Debug for LoopbackPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("LoopbackPeer")
            .field("sent", &state.sent.len())
            .field("pending", &state.pending.len())
            .field("response_delay", &state.response_delay)
            .finish()
    }
}

impl LoopbackPeer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every sent message through `responder`
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + 'static,
    {
        self.state.borrow_mut().responder = Some(Box::new(responder));
    }

    /// Hold each answer back for `attempts` receive attempts
    pub fn set_response_delay(&self, attempts: u32) {
        self.state.borrow_mut().response_delay = attempts;
    }

    /// Queue bytes for the transport to receive, subject to the response delay
    pub fn push_response(&self, bytes: impl Into<Vec<u8>>) {
        let mut state = self.state.borrow_mut();
        let delay = state.response_delay;
        state.pending.push_back((delay, bytes.into()));
    }

    /// Every message sent so far, oldest first
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.state.borrow().sent.clone()
    }

    /// Number of answers not yet delivered
    pub fn pending_responses(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn open_count(&self) -> u32 {
        self.state.borrow().open_count
    }

    pub fn close_count(&self) -> u32 {
        self.state.borrow().close_count
    }

    fn record_sent(&self, message: &[u8]) {
        let mut state = self.state.borrow_mut();
        state.sent.push(message.to_vec());
        let answer = state.responder.as_mut().and_then(|responder| responder(message));
        if let Some(answer) = answer {
            let delay = state.response_delay;
            state.pending.push_back((delay, answer));
        }
    }

    /// One receive attempt: age pending answers, hand out those that are due
    fn take_due(&self) -> Vec<Vec<u8>> {
        let mut state = self.state.borrow_mut();
        let mut due = Vec::new();
        while let Some((0, _)) = state.pending.front() {
            if let Some((_, bytes)) = state.pending.pop_front() {
                due.push(bytes);
            }
        }
        for (delay, _) in state.pending.iter_mut() {
            *delay = delay.saturating_sub(1);
        }
        due
    }
}

/// Transport whose far end is a `LoopbackPeer`
#[derive(Debug)]
pub struct LoopbackTransport {
    peer: LoopbackPeer,
    open: bool,
    inbound: FrameAccumulator,
}

impl LoopbackTransport {
    pub fn new(peer: LoopbackPeer) -> Self {
        Self {
            peer,
            open: false,
            inbound: FrameAccumulator::new(),
        }
    }

    pub fn peer(&self) -> &LoopbackPeer {
        &self.peer
    }

    fn ensure_open(&self) -> PlcResult<()> {
        if !self.open {
            return Err(PlcError::Transport(io::Error::new(
                io::ErrorKind::NotConnected,
                "Loopback transport not open",
            )));
        }
        Ok(())
    }
}

impl Transport for LoopbackTransport {
    fn transport_code(&self) -> &'static str {
        "loopback"
    }

    fn open(&mut self) -> PlcResult<()> {
        if self.open {
            return Err(PlcError::AlreadyConnected);
        }
        debug!("Opening loopback transport");
        self.open = true;
        self.peer.state.borrow_mut().open_count += 1;
        Ok(())
    }

    fn close(&mut self) -> PlcResult<()> {
        if self.open {
            debug!("Closing loopback transport");
            self.open = false;
            self.peer.state.borrow_mut().close_count += 1;
        }
        self.inbound.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn send_message(&mut self, message: &[u8]) -> PlcResult<()> {
        self.ensure_open()?;
        trace!("Loopback sent {} bytes: {:02X?}", message.len(), message);
        self.peer.record_sent(message);
        Ok(())
    }

    fn fill_receive_buffer(&mut self) -> PlcResult<usize> {
        self.ensure_open()?;
        let mut total = 0;
        for bytes in self.peer.take_due() {
            total += bytes.len();
            self.inbound.extend_from_slice(&bytes);
        }
        Ok(total)
    }

    fn receive_buffer(&mut self) -> &mut FrameAccumulator {
        &mut self.inbound
    }
}

/// Factory for `loopback` transports
///
/// Every transport it creates is attached to the factory's peer.
#[derive(Debug, Default, Clone)]
pub struct LoopbackTransportFactory {
    peer: LoopbackPeer,
}

impl LoopbackTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach created transports to an existing peer
    pub fn with_peer(peer: LoopbackPeer) -> Self {
        Self { peer }
    }

    pub fn peer(&self) -> &LoopbackPeer {
        &self.peer
    }
}

impl TransportFactory for LoopbackTransportFactory {
    fn transport_code(&self) -> &'static str {
        "loopback"
    }

    fn transport_name(&self) -> &'static str {
        "Loopback"
    }

    fn create(
        &self,
        _connect_info: &str,
        _default_port: Option<u16>,
        _parameters: &Parameters,
    ) -> PlcResult<Box<dyn Transport>> {
        Ok(Box::new(LoopbackTransport::new(self.peer.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::select_proxy;

    #[test]
    fn test_closed_transport_rejects_io() {
        let mut transport = LoopbackTransport::new(LoopbackPeer::new());
        assert!(transport.send_message(&[1]).is_err());
        assert!(transport.fill_receive_buffer().is_err());
        transport.open().unwrap();
        assert!(matches!(transport.open(), Err(PlcError::AlreadyConnected)));
    }

    #[test]
    fn test_responder_answers_sent_messages() {
        let peer = LoopbackPeer::new();
        peer.set_responder(|request| Some(vec![0x01, 0x00, 0x04, request[0]]));
        let mut transport = LoopbackTransport::new(peer.clone());
        transport.open().unwrap();

        transport.send_message(&[0x7F]).unwrap();
        let message = transport.select_message(3, select_proxy).unwrap().unwrap();
        assert_eq!(message.get_bytes(0, 4).unwrap(), &[0x01, 0x00, 0x04, 0x7F]);
        assert_eq!(peer.sent_messages(), vec![vec![0x7F]]);
    }

    #[test]
    fn test_response_delay_counts_receive_attempts() {
        let peer = LoopbackPeer::new();
        peer.set_response_delay(2);
        let mut transport = LoopbackTransport::new(peer.clone());
        transport.open().unwrap();
        peer.push_response(vec![0x01, 0x00, 0x03]);

        assert!(transport.select_message(3, select_proxy).unwrap().is_none());
        assert!(transport.select_message(3, select_proxy).unwrap().is_none());
        assert!(transport.select_message(3, select_proxy).unwrap().is_some());
        assert_eq!(peer.pending_responses(), 0);
    }

    #[test]
    fn test_factory_shares_peer() {
        let factory = LoopbackTransportFactory::new();
        let mut transport = factory.create("anything", None, &Parameters::new()).unwrap();
        assert_eq!(transport.transport_code(), "loopback");
        transport.open().unwrap();
        transport.close().unwrap();
        assert_eq!(factory.peer().open_count(), 1);
        assert_eq!(factory.peer().close_count(), 1);
    }
}
