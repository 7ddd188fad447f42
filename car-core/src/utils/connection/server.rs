//! HTTP Server Module
//!
//! Serves the car's REST routes with `picoserve` on a tokio `LocalSet`, one
//! local task per TCP connection. Every route accepts GET and POST and hands
//! the raw body to [`dispatch`](super::dispatch::dispatch).

use std::{net::SocketAddr, rc::Rc, time::Duration};

use embedded_io_async::{Read, Write};
use picoserve::{
    extract::{FromRequest, State},
    request::{ReadAllBodyError, RequestBody, RequestParts},
    response::{Connection, Content, IntoResponse, Response, ResponseWriter, StatusCode},
    routing::{get, PathRouter},
    ResponseSent, Router,
};
use tokio::net::TcpListener;

use super::dispatch::{self, dispatch, Method, Reply, Route};
use crate::utils::controllers::SharedCar;

/// Request body, read in full. Empty for body-less requests.
pub struct RawBody(pub Vec<u8>);

impl<'r, S> FromRequest<'r, S> for RawBody {
    type Rejection = Reply;

    async fn from_request<R: Read>(
        _state: &'r S,
        _parts: RequestParts<'r>,
        body: RequestBody<'r, R>,
    ) -> Result<Self, Self::Rejection> {
        match body.read_all().await {
            Ok(bytes) => Ok(RawBody(bytes.to_vec())),
            Err(ReadAllBodyError::BufferIsTooSmall) => {
                tracing::warn!("request body does not fit the connection buffer");
                Err(Reply::error(dispatch::PAYLOAD_TOO_LARGE, "Request body too large"))
            }
            Err(error) => {
                tracing::warn!(?error, "failed to read request body");
                Err(Reply::error(dispatch::BAD_REQUEST, "Failed to read request body"))
            }
        }
    }
}

/// Encoded JSON, sent with a single `application/json` content type.
struct JsonBody(String);

impl Content for JsonBody {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn content_length(&self) -> usize {
        self.0.len()
    }

    async fn write_content<W: Write>(
        self,
        writer: W,
    ) -> Result<(), W::Error> {
        self.0.as_bytes().write_content(writer).await
    }
}

impl IntoResponse for Reply {
    async fn write_to<R: Read, W: ResponseWriter<Error = R::Error>>(
        self,
        connection: Connection<'_, R>,
        response_writer: W,
    ) -> Result<ResponseSent, W::Error> {
        Response::new(StatusCode::new(self.status), JsonBody(self.body))
            .write_to(connection, response_writer)
            .await
    }
}

/// Register `$route` for both GET and POST.
macro_rules! car_routes {
    ($router:expr, $($route:expr),+ $(,)?) => {{
        let router = $router;
        $(
            let router = router.route(
                $route.path(),
                get(|State(car): State<SharedCar>, RawBody(body): RawBody| async move {
                    dispatch(&car, Method::Get, $route, &body)
                })
                .post(|State(car): State<SharedCar>, RawBody(body): RawBody| async move {
                    dispatch(&car, Method::Post, $route, &body)
                }),
            );
        )+
        router
    }};
}

/// Router for every [`Route`], with the shared car as state.
pub fn router() -> Router<impl PathRouter<SharedCar>, SharedCar> {
    car_routes!(
        Router::new(),
        Route::Index,
        Route::Api,
        Route::Forward,
        Route::Backward,
        Route::RotateClockwise,
        Route::RotateAnticlockwise,
        Route::Stop,
        Route::SpeedSet,
        Route::SpeedGet,
        Route::SpeedLeft,
        Route::SpeedRight,
    )
}

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub fn default_config() -> picoserve::Config<Duration> {
    picoserve::Config::new(picoserve::Timeouts {
        start_read_request: Some(Duration::from_secs(5)),
        persistent_start_read_request: Some(Duration::from_secs(1)),
        read_request: Some(Duration::from_secs(1)),
        write: Some(Duration::from_secs(5)),
    })
    .keep_connection_alive()
}

/// Bind `addr` and serve until the returned future is dropped.
///
/// Only binding can fail; errors on individual connections are logged.
pub async fn run(
    addr: SocketAddr,
    car: SharedCar,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Starting server at http://{}", listener.local_addr()?);
    serve_on(listener, car).await;
    Ok(())
}

/// Accept connections from an already bound `listener`, one local task each.
pub async fn serve_on(
    listener: TcpListener,
    car: SharedCar,
) {
    let app = Rc::new(router());
    let config = Rc::new(default_config());

    tokio::task::LocalSet::new()
        .run_until(async move {
            loop {
                let (stream, remote) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(error) => {
                        tracing::warn!(%error, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                };
                tracing::debug!(%remote, "connection accepted");

                let app = Rc::clone(&app);
                let config = Rc::clone(&config);
                let car = car.clone();

                tokio::task::spawn_local(async move {
                    match picoserve::serve_with_state(&app, &config, &mut [0; 2048], stream, &car)
                        .await
                    {
                        Ok(handled) => {
                            tracing::debug!(%remote, handled, "connection closed")
                        }
                        Err(error) => tracing::warn!(%remote, ?error, "connection error"),
                    }
                });
            }
        })
        .await
}
