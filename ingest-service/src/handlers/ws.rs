//! `GET /ws` — status fan-out over a websocket. Clients send
//! subscribe/unsubscribe frames; the session forwards matching
//! `StatusEvent`s for the lifetime of each subscription.

use crate::fanout::FanoutService;
use crate::models::ws::{WsInboundFrame, WsOutboundFrame};
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(ActixMessage)]
#[rtype(result = "()")]
struct ForwardFrame(String);

struct VideoWsSession {
    fanout: Arc<FanoutService>,
    hb: Instant,
    /// One forwarding task per subscribed video; aborted on unsubscribe or
    /// session stop.
    forwarders: HashMap<Uuid, tokio::task::JoinHandle<()>>,
}

impl VideoWsSession {
    fn new(fanout: Arc<FanoutService>) -> Self {
        VideoWsSession {
            fanout,
            hb: Instant::now(),
            forwarders: HashMap::new(),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!("websocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn subscribe(&mut self, video_id: Uuid, ctx: &mut ws::WebsocketContext<Self>) {
        if self.forwarders.contains_key(&video_id) {
            return;
        }
        let mut sub = self.fanout.subscribe_video(video_id);
        let addr = ctx.address();
        let handle = tokio::spawn(async move {
            while let Some(event) = sub.recv().await {
                let frame = WsOutboundFrame::Status(event);
                if let Ok(json) = serde_json::to_string(&frame) {
                    addr.do_send(ForwardFrame(json));
                }
            }
        });
        self.forwarders.insert(video_id, handle);

        let ack = WsOutboundFrame::Subscribed { video_id };
        if let Ok(json) = serde_json::to_string(&ack) {
            ctx.text(json);
        }
    }

    fn unsubscribe(&mut self, video_id: Uuid, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some(handle) = self.forwarders.remove(&video_id) {
            handle.abort();
        }
        let ack = WsOutboundFrame::Unsubscribed { video_id };
        if let Ok(json) = serde_json::to_string(&ack) {
            ctx.text(json);
        }
    }
}

impl Actor for VideoWsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        for (_, handle) in self.forwarders.drain() {
            handle.abort();
        }
    }
}

impl Handler<ForwardFrame> for VideoWsSession {
    type Result = ();

    fn handle(&mut self, msg: ForwardFrame, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VideoWsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<WsInboundFrame>(&text) {
                Ok(WsInboundFrame::Subscribe { video_id }) => self.subscribe(video_id, ctx),
                Ok(WsInboundFrame::Unsubscribe { video_id }) => self.unsubscribe(video_id, ctx),
                Err(e) => {
                    let err = WsOutboundFrame::Error {
                        message: format!("invalid frame: {e}"),
                    };
                    if let Ok(json) = serde_json::to_string(&err) {
                        ctx.text(json);
                    }
                }
            },
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("binary websocket frames are not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => {}
        }
    }
}

pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    fanout: web::Data<Arc<FanoutService>>,
) -> Result<HttpResponse, Error> {
    ws::start(VideoWsSession::new(fanout.get_ref().clone()), &req, stream)
}
