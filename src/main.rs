//! # h2codec デモサーバー
//!
//! monoio (io_uring) 上で動く平文 HTTP/2 (h2c, prior knowledge) の
//! 最小サーバーです。コーデックの動作確認用で、受信したリクエストの
//! ヘッダーを確認し、固定レスポンスを返します。
//!
//! ```bash
//! cargo run --release
//! curl --http2-prior-knowledge http://127.0.0.1:8080/
//! ```

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::Path;

use ftlog::{error, info, warn};
use monoio::net::{TcpListener, TcpStream};
use monoio::RuntimeBuilder;

use h2codec::config::Config;
use h2codec::connection::Http2Connection;
use h2codec::error::Http2Result;
use h2codec::frame::{Frame, HeaderEntry, HeaderList};

fn main() {
    let _guard = ftlog::Builder::new().try_init().unwrap();

    let config = match Config::load(Path::new("config.toml")) {
        Ok(config) => config,
        Err(e) => {
            warn!("{} -- using defaults", e);
            Config::default()
        }
    };

    info!("Listening on {} (h2c prior knowledge)", config.listen);

    let mut rt = RuntimeBuilder::<monoio::IoUringDriver>::new()
        .enable_timer()
        .build()
        .expect("Failed to build monoio runtime");

    rt.block_on(async move {
        let listener = match TcpListener::bind(&config.listen) {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind {}: {}", config.listen, e);
                return;
            }
        };

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Connection from {}", addr);
                    let settings = config.to_http2_settings();
                    monoio::spawn(async move {
                        if let Err(e) = serve_connection(stream, settings).await {
                            warn!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    });
}

/// 1 コネクションを処理
async fn serve_connection(
    stream: TcpStream,
    settings: h2codec::Http2Settings,
) -> Http2Result<()> {
    let mut conn = Http2Connection::new(stream, settings);
    conn.handshake().await?;

    loop {
        let frame = match conn.read_frame().await {
            Ok(frame) => frame,
            Err(h2codec::Http2Error::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        conn.process_control_frame(&frame).await?;

        match frame {
            Frame::Headers {
                stream_id,
                end_stream,
                fields,
                ..
            } => {
                let method = fields
                    .get(b":method")
                    .map(|v| String::from_utf8_lossy(v).into_owned())
                    .unwrap_or_default();
                let path = fields
                    .get(b":path")
                    .map(|v| String::from_utf8_lossy(v).into_owned())
                    .unwrap_or_default();
                info!("Request on stream {}: {} {}", stream_id, method, path);

                // リクエストが完結したら固定レスポンスを返す
                if end_stream {
                    respond(&mut conn, stream_id).await?;
                }
            }
            Frame::Data {
                stream_id,
                end_stream,
                data,
            } => {
                info!("DATA on stream {}: {} bytes", stream_id, data.len());
                if end_stream {
                    respond(&mut conn, stream_id).await?;
                }
            }
            Frame::GoAway { .. } => return Ok(()),
            _ => {}
        }
    }
}

/// 固定の 200 レスポンスを返す
async fn respond<S>(conn: &mut Http2Connection<S>, stream_id: u32) -> Http2Result<()>
where
    S: monoio::io::AsyncReadRent + monoio::io::AsyncWriteRentExt + Unpin,
{
    let body = b"hello from h2codec\n";

    let mut fields = HeaderList::new();
    fields.push(HeaderEntry::new(":status", "200"));
    fields.push(HeaderEntry::new("content-type", "text/plain"));
    fields.push(HeaderEntry::new("content-length", body.len().to_string()));

    conn.send_headers(stream_id, &fields, false, None).await?;
    conn.send_data(stream_id, body, true).await
}
