use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 50051;

/// Upper bound on a single frame. A full-size scene or tile result is far
/// below this; anything larger is a corrupt or hostile length prefix.
const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

// ─── Render configuration and work units ────────────────────────────────────

/// The immutable render parameters handed to every worker at registration —
/// they are not repeated per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub image_width: u32,
    pub image_height: u32,
    pub tile_size: u32,
    pub samples_per_pixel: u32,
    pub max_depth: u32,
}

/// A rectangular subregion of the output image, the unit of work
/// distribution. Tiles cover the image in raster order; right/bottom edge
/// tiles may be narrower than the configured tile size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub x0: u32,
    pub y0: u32,
    pub width: u32,
    pub height: u32,
    pub task_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTask {
    pub tile: Tile,
    pub samples_per_pixel: u32,
    pub max_depth: u32,
}

/// A rendered tile on its way back: one byte per channel, `width·height·3`
/// bytes in row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileResult {
    pub tile: Tile,
    pub pixel_data: Vec<u8>,
}

// ─── RPC surface ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    InvalidArgument,
    Unauthenticated,
    NotFound,
    PermissionDenied,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Serving,
    NotServing,
}

/// The four unary calls of the coordination protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    HealthCheck,
    RegisterWorker { hostname: String },
    RequestTask { worker_id: String },
    SubmitResult { worker_id: String, result: TileResult },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Health {
        status: HealthStatus,
    },
    Registered {
        worker_id: String,
        scene_bytes: Vec<u8>,
        config: RenderConfig,
    },
    Assignment {
        has_assignment: bool,
        task: Option<RenderTask>,
    },
    SubmitAck,
}

/// Every reply travels wrapped in an envelope; error statuses carry no body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: Status,
    pub response: Option<Response>,
}

/// What a client-side call can come back with: a status code from the
/// coordinator, or a failure getting there and back.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc returned status {0:?}")]
    Status(Status),

    #[error("transport: {0}")]
    Transport(#[from] io::Error),

    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),

    #[error("protocol violation: {0}")]
    Protocol(String),
}

// ─── Framing ────────────────────────────────────────────────────────────────

/// Writes one message as a frame: a u32 big-endian length prefix followed by
/// the bincode body.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), RpcError> {
    let body = bincode::serialize(message)?;
    let len = u32::try_from(body.len())
        .map_err(|_| RpcError::Protocol(format!("frame too large: {} bytes", body.len())))?;
    if len > MAX_FRAME_LEN {
        return Err(RpcError::Protocol(format!("frame too large: {len} bytes")));
    }
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Reads one length-prefixed frame and decodes it.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, RpcError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(RpcError::Protocol(format!(
            "incoming frame claims {len} bytes"
        )));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;
    Ok(bincode::deserialize(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_task() -> RenderTask {
        RenderTask {
            tile: Tile {
                x0: 64,
                y0: 128,
                width: 64,
                height: 32,
                task_id: 7,
            },
            samples_per_pixel: 100,
            max_depth: 50,
        }
    }

    #[test]
    fn frames_round_trip() {
        let request = Request::SubmitResult {
            worker_id: "worker-3".into(),
            result: TileResult {
                tile: sample_task().tile,
                pixel_data: vec![0, 127, 255],
            },
        };
        let mut wire = Vec::new();
        write_frame(&mut wire, &request).unwrap();

        let decoded: Request = read_frame(&mut Cursor::new(&wire)).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn envelope_round_trips_with_assignment() {
        let envelope = Envelope {
            status: Status::Ok,
            response: Some(Response::Assignment {
                has_assignment: true,
                task: Some(sample_task()),
            }),
        };
        let mut wire = Vec::new();
        write_frame(&mut wire, &envelope).unwrap();
        let decoded: Envelope = read_frame(&mut Cursor::new(&wire)).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn hostile_length_prefix_is_rejected() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&u32::MAX.to_be_bytes());
        wire.extend_from_slice(&[0; 16]);
        let err = read_frame::<_, Request>(&mut Cursor::new(&wire)).unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[test]
    fn truncated_frame_is_a_transport_error() {
        let mut wire = Vec::new();
        write_frame(&mut wire, &Request::HealthCheck).unwrap();
        wire.truncate(wire.len() - 1);
        let err = read_frame::<_, Request>(&mut Cursor::new(&wire)).unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
    }
}
