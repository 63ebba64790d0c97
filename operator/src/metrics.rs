use hyper::{
    Body, Request, Response, Server,
    service::{make_service_fn, service_fn},
};
use prometheus::{Encoder, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;

async fn scrape(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    Ok(Response::new(Body::from(buffer)))
}

/// Serves `/metrics` (and anything else, since there's only one route) on
/// `port` for as long as the process lives. Spawned as a detached task;
/// a bind failure is fatal since the caller asked for metrics explicitly.
pub async fn run_server(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let make_svc =
        make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(scrape)) });
    println!("metrics server listening on {addr}");
    if let Err(e) = Server::bind(&addr).serve(make_svc).await {
        eprintln!("metrics server error: {e}");
    }
}
