//! A local HTTP server for the tests to talk to
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

/// Serve `handler` on a free local port until the test ends.  Returns
/// the address to send to
pub(crate) async fn serve<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    let service = make_service_fn(move |_: _| {
        let handler = handler.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let response = handler(req);
                async move { Ok::<_, Infallible>(response.await) }
            }))
        }
    });
    let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
    let server = Server::bind(&addr).serve(service);
    let local = server.local_addr();
    tokio::spawn(server);
    local
}
