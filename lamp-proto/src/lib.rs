//! Lamp wire protocol - GATT layout, MAC codec, control commands and framing

pub mod ble;
pub mod command;
pub mod mac;

use std::io::{self, Read, Write};

pub use command::{ClientType, Command, CommandError, Owner, State};
pub use mac::{MacAddress, MacParseError, mac_from_bytes, mac_to_bytes};

/// Largest payload a frame may carry
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Frame: wraps any message with type and length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(msg_type: u16, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }

    /// Encode as `msg_type (u16 BE) || len (u32 BE) || payload`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(6 + self.payload.len());
        buf.extend_from_slice(&self.msg_type.to_be_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Write frame to a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        // one write so a reader never sees a header without its payload
        writer.write_all(&self.to_bytes())
    }

    /// Read frame from a reader
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut header = [0u8; 6];
        reader.read_exact(&mut header)?;
        let (msg_type, len) = parse_header(&header)?;

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload)?;

        Ok(Self { msg_type, payload })
    }
}

fn parse_header(header: &[u8; 6]) -> io::Result<(u16, usize)> {
    let msg_type = u16::from_be_bytes([header[0], header[1]]);
    let len = u32::from_be_bytes([header[2], header[3], header[4], header[5]]) as usize;

    // Sanity check
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }

    Ok((msg_type, len))
}

/// Async frame operations for tokio
#[cfg(feature = "async")]
pub mod async_io {
    use super::*;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> io::Result<()> {
        writer.write_all(&frame.to_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Frame> {
        let mut header = [0u8; 6];
        reader.read_exact(&mut header).await?;
        let (msg_type, len) = parse_header(&header)?;

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;

        Ok(Frame { msg_type, payload })
    }

    /// Write a command as one frame
    pub async fn write_command<W: AsyncWrite + Unpin>(
        writer: &mut W,
        command: Command,
    ) -> io::Result<()> {
        write_frame(writer, &command.to_frame()).await
    }

    /// Read one frame and decode it as a command
    pub async fn read_command<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Command> {
        let frame = read_frame(reader).await?;
        Command::from_frame(&frame).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_header_layout() {
        let frame = Frame::new(0x0012, vec![0x42]);
        assert_eq!(frame.to_bytes(), vec![0x00, 0x12, 0, 0, 0, 1, 0x42]);

        let mut cursor = io::Cursor::new(frame.to_bytes());
        assert_eq!(Frame::read_from(&mut cursor).unwrap(), frame);
    }

    #[test]
    fn oversized_frames_are_refused() {
        let mut bytes = vec![0x00, 0x10];
        bytes.extend_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes());
        let err = Frame::read_from(&mut io::Cursor::new(bytes)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn commands_cross_a_duplex_pipe() {
        let (mut a, mut b) = tokio::io::duplex(64);
        async_io::write_command(&mut a, Command::PowerDeviceOn).await.unwrap();
        async_io::write_command(&mut a, Command::DeviceStateChanged(State::Off))
            .await
            .unwrap();

        assert_eq!(async_io::read_command(&mut b).await.unwrap(), Command::PowerDeviceOn);
        assert_eq!(
            async_io::read_command(&mut b).await.unwrap(),
            Command::DeviceStateChanged(State::Off)
        );
    }
}
