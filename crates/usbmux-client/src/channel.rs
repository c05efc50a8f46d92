//! One-shot tunnel request to a device port
//!
//! A tunnel uses a fresh daemon connection: the client sends a `Connect`
//! request, reads exactly one `Result` frame, and on success the same
//! connection carries raw bytes to and from the device port.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::Decoder;

use usbmux_core::{ConnectError, MuxStream};
use usbmux_protocol::message::message_type;
use usbmux_protocol::{
    encode_message, ConnectRequest, Envelope, FrameHeader, MuxCodec, ProtocolError, RawFrame,
    ResultAck, ResultCode,
};

/// Read exactly one frame without consuming any bytes past it
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<RawFrame, ProtocolError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = BytesMut::zeroed(4);
    reader.read_exact(&mut buf[..]).await?;

    let length = FrameHeader::peek_length(&buf)?.ok_or(ProtocolError::InvalidLength(0))?;
    buf.resize(length, 0);
    reader.read_exact(&mut buf[4..]).await?;

    MuxCodec::new()
        .decode(&mut buf)?
        .ok_or(ProtocolError::InvalidLength(length as u32))
}

/// Send a connect request on `stream` and interpret the daemon's answer
///
/// On success the stream is handed back untouched for the caller to use as
/// the device tunnel. On any failure the stream is shut down.
pub async fn open_tunnel(
    mut stream: MuxStream,
    request: &ConnectRequest,
) -> Result<MuxStream, ConnectError> {
    match exchange(&mut stream, request).await {
        Ok(ResultCode::Ok) => {
            tracing::debug!(
                "Tunnel open to device {} port {}",
                request.device_id,
                request.port()
            );
            Ok(stream)
        }
        Ok(code) => {
            let _ = stream.shutdown().await;
            Err(match code {
                ResultCode::DeviceDisconnected => ConnectError::DeviceDisconnected,
                ResultCode::PortUnavailable => ConnectError::PortUnavailable,
                ResultCode::Malformed => ConnectError::MalformedRequest,
                other => ConnectError::Refused {
                    code: other.as_number(),
                },
            })
        }
        Err(e) => {
            let _ = stream.shutdown().await;
            Err(e)
        }
    }
}

async fn exchange(
    stream: &mut MuxStream,
    request: &ConnectRequest,
) -> Result<ResultCode, ConnectError> {
    let bytes = encode_message(request)?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;

    let frame = read_frame(stream).await?;
    let envelope: Envelope = frame.decode()?;
    if envelope.message_type != message_type::RESULT {
        return Err(ConnectError::UnexpectedMessage(envelope.message_type));
    }

    let ack: ResultAck = frame.decode()?;
    Ok(ack.code())
}
