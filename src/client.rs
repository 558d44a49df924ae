use crate::protocol::{FrameCodec, OpCode, Request, Response};
use crate::transport::ClientTransport;
use crate::{EmsError, GridView, Result, Seat, SessionEndpoints, SessionId};
use std::sync::Arc;
use tracing::{debug, info};

/// Client side of one session.
pub struct EmsClient<C: ClientTransport> {
    transport: Arc<C>,
    endpoints: SessionEndpoints,
    session_id: SessionId,
    codec: FrameCodec,
    writer: C::Writer,
    reader: C::Reader,
}

fn unexpected(op: OpCode, response: Response) -> EmsError {
    EmsError::InvalidRequest(format!("Unexpected response to {:?}: {:?}", op, response))
}

impl<C: ClientTransport> EmsClient<C> {
    /// Creates the session endpoints and performs the connect handshake.
    pub async fn setup(transport: Arc<C>, endpoints: SessionEndpoints, codec: FrameCodec) -> Result<Self> {
        let (writer, reader) = transport.create_endpoints(&endpoints).await?;
        let mut client = Self {
            transport,
            endpoints,
            session_id: 0,
            codec,
            writer,
            reader,
        };

        match client.handshake().await {
            Ok(session_id) => {
                client.session_id = session_id;
                info!(session_id, "Connected to server");
                Ok(client)
            }
            Err(e) => {
                client.transport.remove_endpoints(&client.endpoints).await?;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<SessionId> {
        let request = Request::Connect(self.endpoints.clone()).encode()?;
        let frame = self.codec.encode(&request)?;
        self.transport.send_to_server(&frame).await?;

        match self.read_response(OpCode::Connect).await? {
            Response::Connected(session_id) => Ok(session_id),
            other => Err(unexpected(OpCode::Connect, other)),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    async fn read_response(&mut self, op: OpCode) -> Result<Response> {
        let frame = self
            .codec
            .read_raw(&mut self.reader)
            .await?
            .ok_or_else(|| EmsError::TransportFailure("server closed the response endpoint".to_string()))?;
        let text = self.codec.decode(&frame)?;
        Response::decode(op, &text)
    }

    async fn call(&mut self, request: Request) -> Result<Response> {
        let op = request.op_code();
        debug!(session_id = self.session_id, "Sending {:?}", op);

        self.codec.write_frame(&mut self.writer, &request.encode()?).await?;
        self.read_response(op).await?.into_result()
    }

    pub async fn create(&mut self, event_id: u32, rows: usize, cols: usize) -> Result<()> {
        match self.call(Request::Create { event_id, rows, cols }).await? {
            Response::Created => Ok(()),
            other => Err(unexpected(OpCode::Create, other)),
        }
    }

    /// Returns the reservation id assigned to the seats.
    pub async fn reserve(&mut self, event_id: u32, seats: &[Seat]) -> Result<u32> {
        let request = Request::Reserve {
            event_id,
            seats: seats.to_vec(),
        };
        match self.call(request).await? {
            Response::Reserved { reservation_id } => Ok(reservation_id),
            other => Err(unexpected(OpCode::Reserve, other)),
        }
    }

    pub async fn show(&mut self, event_id: u32) -> Result<GridView> {
        match self.call(Request::Show { event_id }).await? {
            Response::Grid(view) => Ok(view),
            other => Err(unexpected(OpCode::Show, other)),
        }
    }

    pub async fn list(&mut self) -> Result<Vec<u32>> {
        match self.call(Request::List).await? {
            Response::Events(ids) => Ok(ids),
            other => Err(unexpected(OpCode::List, other)),
        }
    }

    /// Ends the session and removes its endpoints.
    pub async fn quit(mut self) -> Result<()> {
        let sent = self
            .codec
            .write_frame(&mut self.writer, &Request::Quit.encode()?)
            .await;
        self.transport.remove_endpoints(&self.endpoints).await?;
        info!(session_id = self.session_id, "Disconnected from server");
        sent
    }
}
