//! SocketCAN backend for running the wheel logic on a Linux host, against
//! `vcan0` or a USB adapter.
//!
//! The raw socket is non-blocking and, like the hardware backend, handed out
//! one frame per `receive`. Frames the kernel queued behind it wait for later
//! ticks instead of being overwritten.
//!
//! Remote requests keep their flag in [`Frame::raw_id`], where the codec masks
//! it. Extended and error frames are dropped.

use std::io;

use embedded_can::{Frame as EmbeddedFrame, Id, StandardId};
use socketcan::{CanFrame, CanSocket, Socket};

use crate::{error::Error, frame::Frame, transport::Transport};

/// A raw CAN socket bound to one interface
pub struct HostSocket {
    socket: CanSocket,
}

impl HostSocket {
    /// Binds to `interface` and switches the socket to non-blocking mode.
    pub fn open(interface: &str) -> Result<Self, Error> {
        let socket = CanSocket::open(interface).map_err(socket_error)?;
        socket.set_nonblocking(true).map_err(socket_error)?;

        info!("socketcan: bound to {}", interface);

        Ok(Self { socket })
    }

    /// Closes the socket
    pub fn shutdown(self) {
        drop(self.socket);
        info!("socketcan: closed");
    }
}

impl Transport for HostSocket {
    fn send(&mut self, id: StandardId, payload: &[u8]) -> Result<(), Error> {
        let frame = <CanFrame as EmbeddedFrame>::new(id, payload)
            .ok_or(Error::InvalidLength(payload.len()))?;

        self.socket.write_frame(&frame).map_err(|e| {
            warn!("socketcan: write failed, os error {}", e.raw_os_error().unwrap_or(0));
            socket_error(e)
        })
    }

    fn receive(&mut self) -> Option<Frame> {
        match self.socket.read_frame() {
            Ok(frame) => from_socket_frame(&frame),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                warn!("socketcan: read failed, os error {}", e.raw_os_error().unwrap_or(0));
                None
            }
        }
    }
}

fn socket_error(e: io::Error) -> Error {
    Error::Socket(e.kind())
}

fn from_socket_frame(frame: &CanFrame) -> Option<Frame> {
    if let CanFrame::Error(_) = frame {
        trace!("socketcan: dropped error frame");
        return None;
    }

    let Id::Standard(id) = EmbeddedFrame::id(frame) else {
        trace!("socketcan: dropped extended frame");
        return None;
    };

    if EmbeddedFrame::is_remote_frame(frame) {
        Frame::new_remote_request(id, EmbeddedFrame::dlc(frame))
    } else {
        Frame::new_data(id, EmbeddedFrame::data(frame))
    }
}

#[cfg(test)]
mod tests {
    use embedded_can::{ExtendedId, Frame as EmbeddedFrame, StandardId};
    use socketcan::CanFrame;

    use super::{from_socket_frame, HostSocket};
    use crate::{
        codec::{decode_inbound_frame, INBOUND_ID, OUTBOUND_ID},
        frame::REMOTE_FLAG,
        transport::Transport,
    };

    const ECU_PAYLOAD: [u8; 8] = [0x01, 0x90, 0x01, 0x68, 0xC3, 4, 55, 0x07];

    #[test]
    fn data_frames_reach_the_codec() {
        let socket_frame = <CanFrame as EmbeddedFrame>::new(INBOUND_ID, &ECU_PAYLOAD).unwrap();
        let frame = from_socket_frame(&socket_frame).unwrap();

        assert_eq!(frame.standard_id(), INBOUND_ID);
        assert_eq!(frame.payload(), &ECU_PAYLOAD);
        assert_eq!(decode_inbound_frame(&frame).unwrap().gear_actual, 4);
    }

    #[test]
    fn remote_requests_keep_their_flag() {
        let socket_frame = <CanFrame as EmbeddedFrame>::new_remote(INBOUND_ID, 8).unwrap();
        let frame = from_socket_frame(&socket_frame).unwrap();

        assert!(frame.is_remote());
        assert_eq!(frame.raw_id(), 0x201 | REMOTE_FLAG);
        assert_eq!(decode_inbound_frame(&frame), None);
    }

    #[test]
    fn extended_frames_are_dropped() {
        let id = ExtendedId::new(0x201).unwrap();
        let socket_frame = <CanFrame as EmbeddedFrame>::new(id, &ECU_PAYLOAD).unwrap();

        assert_eq!(from_socket_frame(&socket_frame), None);
    }

    #[test]
    #[ignore = "needs a vcan0 interface"]
    fn frames_cross_vcan0() {
        let mut wheel = HostSocket::open("vcan0").unwrap();
        let mut ecu = HostSocket::open("vcan0").unwrap();

        assert_eq!(wheel.receive(), None);
        assert!(wheel.send(OUTBOUND_ID, &[0; 9]).is_err());

        wheel.send(OUTBOUND_ID, &[1, 2, 3, 0, 0, 0, 0, 0]).unwrap();

        let mut received = None;
        for _ in 0..1000 {
            received = ecu.receive();
            if received.is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let frame = received.unwrap();
        assert_eq!(frame.standard_id(), StandardId::new(0x101).unwrap());
        assert_eq!(frame.payload(), &[1, 2, 3, 0, 0, 0, 0, 0]);

        wheel.shutdown();
        ecu.shutdown();
    }
}
