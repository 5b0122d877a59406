use crate::coordinator::Coordinator;
use crate::error::Error;
use crate::protocol::{
    read_frame, write_frame, Envelope, HealthStatus, RenderConfig, RenderTask, Request, Response,
    RpcError, Status, TileResult,
};
use log::{debug, warn};
use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

// ─── Server side ────────────────────────────────────────────────────────────

/// Accept loop: one thread per connection, each serving request frames until
/// the peer hangs up. All protocol work is framing and dispatch — the
/// coordinator itself stays transport-free.
pub fn serve(listener: TcpListener, coordinator: Arc<Coordinator>) -> io::Result<()> {
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("connection from {peer}");
                let coordinator = coordinator.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, &coordinator) {
                        debug!("connection from {peer} closed: {e}");
                    }
                });
            }
            Err(e) => warn!("accept failed: {e}"),
        }
    }
}

fn handle_connection(mut stream: TcpStream, coordinator: &Coordinator) -> Result<(), RpcError> {
    loop {
        let request: Request = read_frame(&mut stream)?;
        let envelope = dispatch(coordinator, request);
        write_frame(&mut stream, &envelope)?;
    }
}

fn dispatch(coordinator: &Coordinator, request: Request) -> Envelope {
    let result = match request {
        Request::HealthCheck => Ok(Response::Health {
            status: coordinator.health(),
        }),
        Request::RegisterWorker { hostname } => {
            coordinator
                .register_worker(&hostname)
                .map(|registration| Response::Registered {
                    worker_id: registration.worker_id,
                    scene_bytes: registration.scene_bytes,
                    config: registration.config,
                })
        }
        Request::RequestTask { worker_id } => {
            coordinator
                .request_task(&worker_id)
                .map(|task| Response::Assignment {
                    has_assignment: task.is_some(),
                    task,
                })
        }
        Request::SubmitResult { worker_id, result } => coordinator
            .submit_result(&worker_id, &result)
            .map(|()| Response::SubmitAck),
    };

    match result {
        Ok(response) => Envelope {
            status: Status::Ok,
            response: Some(response),
        },
        Err(error) => {
            warn!("request rejected: {error}");
            Envelope {
                status: status_for(&error),
                response: None,
            }
        }
    }
}

fn status_for(error: &Error) -> Status {
    match error {
        Error::BadRequest(_) => Status::InvalidArgument,
        Error::Unauthenticated => Status::Unauthenticated,
        Error::NotFound => Status::NotFound,
        Error::PermissionDenied => Status::PermissionDenied,
        Error::Transport(_) | Error::Fatal(_) => Status::Internal,
    }
}

// ─── Client side ────────────────────────────────────────────────────────────

/// A thin unary-call client. Each call opens a fresh connection, which keeps
/// retry and re-registration logic trivial — there is no session state to
/// repair after a coordinator restart.
pub struct Client {
    address: String,
}

impl Client {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn call(&self, request: &Request) -> Result<Response, RpcError> {
        let mut stream = TcpStream::connect(&self.address)?;
        write_frame(&mut stream, request)?;
        let envelope: Envelope = read_frame(&mut stream)?;
        match envelope.status {
            Status::Ok => envelope
                .response
                .ok_or_else(|| RpcError::Protocol("OK envelope without a body".into())),
            status => Err(RpcError::Status(status)),
        }
    }

    pub fn health_check(&self) -> Result<HealthStatus, RpcError> {
        match self.call(&Request::HealthCheck)? {
            Response::Health { status } => Ok(status),
            other => Err(unexpected("HealthCheck", &other)),
        }
    }

    pub fn register_worker(
        &self,
        hostname: &str,
    ) -> Result<(String, Vec<u8>, RenderConfig), RpcError> {
        let request = Request::RegisterWorker {
            hostname: hostname.to_string(),
        };
        match self.call(&request)? {
            Response::Registered {
                worker_id,
                scene_bytes,
                config,
            } => Ok((worker_id, scene_bytes, config)),
            other => Err(unexpected("RegisterWorker", &other)),
        }
    }

    pub fn request_task(&self, worker_id: &str) -> Result<Option<RenderTask>, RpcError> {
        let request = Request::RequestTask {
            worker_id: worker_id.to_string(),
        };
        match self.call(&request)? {
            Response::Assignment { task, .. } => Ok(task),
            other => Err(unexpected("RequestTask", &other)),
        }
    }

    pub fn submit_result(&self, worker_id: &str, result: TileResult) -> Result<(), RpcError> {
        let request = Request::SubmitResult {
            worker_id: worker_id.to_string(),
            result,
        };
        match self.call(&request)? {
            Response::SubmitAck => Ok(()),
            other => Err(unexpected("SubmitResult", &other)),
        }
    }
}

fn unexpected(call: &str, response: &Response) -> RpcError {
    RpcError::Protocol(format!("{call} answered with mismatched {response:?}"))
}
