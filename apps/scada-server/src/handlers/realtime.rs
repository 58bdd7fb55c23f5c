//! 实时推送通道
//!
//! - GET /ws?token=...
//!
//! 握手阶段先校验 token，失败时以 1008 关闭且不登记客户端。

use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::Response,
};
use domain::Identity;
use futures::{SinkExt, StreamExt};
use scada_realtime::{ClientReceiver, HubMessage};
use tracing::debug;

use crate::AppState;
use crate::middleware::bearer_token;

#[derive(Debug, Default, serde::Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = query.token.as_deref().or_else(|| bearer_token(&headers));
    let authenticated = state.hub.authenticate(token);
    match authenticated {
        Ok(identity) => ws.on_upgrade(move |socket| serve_client(state, identity, socket)),
        Err(err) => {
            let code = err.close_code();
            let reason = err.0.to_string();
            ws.on_upgrade(move |mut socket| async move {
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })))
                    .await;
            })
        }
    }
}

async fn serve_client(state: AppState, identity: Identity, socket: WebSocket) {
    let (client_id, rx) = state.hub.register(identity).await;
    let (sink, mut stream) = socket.split();
    let mut send_task = tokio::spawn(forward_outbound(rx, sink));

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            next = stream.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    state
                        .hub
                        .handle_inbound(&client_id, &text, state.callbacks.as_ref())
                        .await;
                }
                Some(Ok(Message::Pong(_))) => state.hub.mark_alive(&client_id).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(target: "scada.realtime", client_id = %client_id, error = %err, "ws_receive_failed");
                    break;
                }
            },
        }
    }

    state.hub.unregister(&client_id).await;
    send_task.abort();
}

/// 把中心下发的消息写入 socket；收到关闭或通道结束后退出。
async fn forward_outbound(
    mut rx: ClientReceiver,
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
) {
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, HubMessage::Close { .. });
        let message = match message {
            HubMessage::Text(text) => Message::Text(text),
            HubMessage::Ping => Message::Ping(Vec::new()),
            HubMessage::Close { code, reason } => Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })),
        };
        if sink.send(message).await.is_err() || closing {
            break;
        }
    }
    let _ = sink.close().await;
}
