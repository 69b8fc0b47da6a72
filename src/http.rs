// ===============================
// src/http.rs (thin JSON adapter over SessionHandle)
// ===============================
//
// Form POST untuk mutasi (sama seperti form halaman web), GET /api/* untuk
// membaca snapshot terakhir. Render halaman HTML tidak ditangani di sini.
//
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::str::FromStr;

use hyper::header::CONTENT_TYPE;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{OrderVariant, Side, Symbol};
use crate::error::ReplayError;
use crate::metrics::encode_metrics;
use crate::session::{OrderRequest, SessionHandle};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Replay(#[from] ReplayError),
}

impl ApiError {
    fn into_response(self) -> Response<Body> {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Replay(e) => {
                let status = match e {
                    ReplayError::InvalidCommand(_) => StatusCode::BAD_REQUEST,
                    ReplayError::EngineTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    ReplayError::EngineInvocation(_) | ReplayError::MalformedReport(_) => StatusCode::BAD_GATEWAY,
                    ReplayError::ResourceStaging(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    ReplayError::SessionClosed => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.code())
            }
        };
        let body = json!({ "error": code, "message": self.to_string() });
        json_response(status, &body)
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(bytes) => Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .unwrap_or_else(|_| Response::new(Body::empty())),
        Err(e) => {
            warn!(?e, "json encode failed");
            let mut resp = Response::new(Body::from("json encode failed"));
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        }
    }
}

fn ok<T: Serialize>(value: &T) -> Result<Response<Body>, ApiError> {
    Ok(json_response(StatusCode::OK, value))
}

async fn read_form(req: Request<Body>) -> Result<HashMap<String, String>, ApiError> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|e| ApiError::BadRequest(format!("body: {e}")))?;
    Ok(url::form_urlencoded::parse(&bytes).into_owned().collect())
}

fn field<'a>(form: &'a HashMap<String, String>, key: &str) -> Result<&'a str, ApiError> {
    form.get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("missing field `{key}`")))
}

fn order_from_form(form: &HashMap<String, String>) -> Result<OrderRequest, ApiError> {
    let side = Side::parse(field(form, "order_type")?)
        .ok_or_else(|| ApiError::BadRequest("order_type must be BUY or SELL".into()))?;
    let variant = OrderVariant::parse(field(form, "order_variant")?)
        .ok_or_else(|| ApiError::BadRequest("order_variant must be LIMIT, MARKET, IOC or FOK".into()))?;
    let price = match form.get("price").map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(p) => Some(Decimal::from_str(p).map_err(|_| ApiError::BadRequest(format!("bad price {p:?}")))?),
        None => None,
    };
    let qty_raw = field(form, "quantity")?;
    let quantity = qty_raw
        .parse::<u64>()
        .map_err(|_| ApiError::BadRequest(format!("bad quantity {qty_raw:?}")))?;
    let symbol = Symbol::parse(field(form, "symbol")?)?;
    Ok(OrderRequest { side, variant, price, quantity, symbol })
}

pub async fn route(req: Request<Body>, session: &SessionHandle) -> Result<Response<Body>, ApiError> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (method, path.as_str()) {
        (Method::POST, "/place_order") => {
            let form = read_form(req).await?;
            let order = order_from_form(&form)?;
            ok(&session.submit_order(order).await?)
        }
        (Method::POST, "/cancel_order") => {
            let form = read_form(req).await?;
            let raw = field(&form, "order_id")?;
            let order_id = raw.parse::<u64>().map_err(|_| ApiError::BadRequest(format!("bad order_id {raw:?}")))?;
            let symbol = Symbol::parse(field(&form, "symbol")?)?;
            ok(&session.cancel_order(order_id, symbol).await?)
        }
        (Method::POST, "/view_orderbook") => {
            let form = read_form(req).await?;
            let symbol = Symbol::parse(field(&form, "view_symbol")?)?;
            ok(&session.view_symbol(symbol).await?)
        }
        (Method::POST, "/reset_orderbook") => {
            session.reset_session().await?;
            ok(&json!({ "status": "reset" }))
        }
        (Method::GET, "/api/symbols") => ok(&session.list_known_symbols()),
        (Method::GET, "/api/commands") => ok(&session.commands().await?),
        (Method::GET, "/api/replay/last") => ok(&session.last_replay()),
        (Method::GET, "/metrics") => Ok(Response::builder()
            .header(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
            .body(Body::from(encode_metrics()))
            .unwrap_or_else(|_| Response::new(Body::empty()))),
        (Method::GET, p) if p.starts_with("/api/orderbook/") => {
            ok(&session.get_order_book(&p["/api/orderbook/".len()..]))
        }
        (Method::GET, p) if p.starts_with("/api/trades/") => ok(&session.get_trades(&p["/api/trades/".len()..])),
        (m, p) => Err(ApiError::NotFound(format!("{m} {p}"))),
    }
}

async fn handle(req: Request<Body>, session: SessionHandle) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let resp = match route(req, &session).await {
        Ok(r) => r,
        Err(e) => {
            warn!(%method, %path, %e, "request failed");
            e.into_response()
        }
    };
    Ok(resp)
}

pub async fn serve(port: u16, session: SessionHandle) -> Result<(), hyper::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let make_svc = make_service_fn(move |_conn| {
        let session = session.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, session.clone()))) }
    });
    info!(%addr, "http listening");
    Server::bind(&addr).serve(make_svc).await
}
