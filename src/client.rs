use anyhow::{bail, Context};
use clap::Parser;
use rmpv::Value;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::message::{Codec, RpcMessage, REPLY_PATTERN};
use crate::transport::framing::{write_frame, FrameReader};

/// Minimal client for one persistent connection: `call` for requests,
/// `notify` for events. No pooling, reconnection, or retries.
pub struct RpcClient {
    frames: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl RpcClient {
    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect to {addr}"))?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            frames: FrameReader::new(read_half),
            writer: write_half,
        })
    }

    /// Sends a request with a generated correlation id and waits for the
    /// matching reply.
    pub async fn call(&mut self, pattern: &str, data: Value) -> anyhow::Result<RpcMessage> {
        let message = RpcMessage::request(pattern, data).with_id(Uuid::new_v4().to_string());
        self.call_message(message).await
    }

    /// Same as [`call`](Self::call) with a server-side deadline override.
    pub async fn call_with_timeout(
        &mut self,
        pattern: &str,
        data: Value,
        timeout_ms: u64,
    ) -> anyhow::Result<RpcMessage> {
        let message = RpcMessage::request(pattern, data)
            .with_id(Uuid::new_v4().to_string())
            .with_timeout_ms(timeout_ms);
        self.call_message(message).await
    }

    /// Sends an already-built request and waits for its reply. When the
    /// request carries no id, the next reply on the connection is taken.
    pub async fn call_message(&mut self, message: RpcMessage) -> anyhow::Result<RpcMessage> {
        let expected_id = message.id.clone();
        self.send(&message).await?;

        loop {
            let Some(payload) = self.frames.next().await? else {
                bail!("connection closed before a reply arrived");
            };
            let reply = Codec::decode(&payload)?;
            if reply.pattern != REPLY_PATTERN {
                continue;
            }
            if expected_id.is_none() || reply.id == expected_id {
                return Ok(reply);
            }
        }
    }

    /// Fires an event. Events produce no reply.
    pub async fn notify(&mut self, pattern: &str, data: Value) -> anyhow::Result<()> {
        self.send(&RpcMessage::event(pattern, data)).await
    }

    async fn send(&mut self, message: &RpcMessage) -> anyhow::Result<()> {
        let encoded = Codec::encode(message)?;
        write_frame(&mut self.writer, &encoded).await?;
        Ok(())
    }
}

#[derive(Parser, Debug)]
pub struct ClientArgs {
    /// Server address like 127.0.0.1:4000
    #[arg(short, long, default_value = "127.0.0.1:4000")]
    pub addr: String,

    /// Pattern to dispatch to (e.g. math.add)
    #[arg(short, long)]
    pub pattern: String,

    /// Payload as a JSON string, e.g. '{"a":5,"b":3}'
    #[arg(short, long, default_value = "{}")]
    pub data: String,

    /// Send as a fire-and-forget event instead of a request
    #[arg(long)]
    pub event: bool,

    /// Per-request timeout override in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

/// One-shot CLI client: connect, send, print the reply.
pub async fn run_client(args: ClientArgs) -> anyhow::Result<()> {
    let json: serde_json::Value =
        serde_json::from_str(&args.data).context("payload must be valid JSON")?;
    let data = rmpv::ext::to_value(json)?;

    let mut client = RpcClient::connect(&args.addr).await?;

    if args.event {
        client.notify(&args.pattern, data).await?;
        println!("event sent");
        return Ok(());
    }

    let reply = match args.timeout_ms {
        Some(timeout_ms) => {
            client
                .call_with_timeout(&args.pattern, data, timeout_ms)
                .await?
        }
        None => client.call(&args.pattern, data).await?,
    };
    println!("{}", reply.data);
    Ok(())
}
