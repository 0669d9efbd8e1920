use std::sync::Arc;

use fastfit_hex::application::order_service::{OrderService, OrderStore};
use fastfit_hex::inbound::http::{HttpServer, HttpServerConfig};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

enum Stopped {
    Requested,
    Server(anyhow::Result<()>),
    Scheduler,
}

fn joined(res: Result<anyhow::Result<()>, JoinError>) -> anyhow::Result<()> {
    res?
}

/// Runs the status scheduler and the HTTP server until `shutdown` is
/// cancelled or either of them stops on its own. Whichever comes first
/// cancels `shutdown` so the other side drains too.
pub async fn run<R: OrderStore>(
    service: Arc<OrderService<R>>,
    server_cfg: HttpServerConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let worker = service.scheduler();
    let http = HttpServer::new(service, server_cfg).await?;
    let mut scheduler = tokio::spawn(worker.run(shutdown.clone()));
    let mut server = tokio::spawn(http.run(shutdown.clone()));

    let stopped = tokio::select! {
        _ = shutdown.cancelled() => Stopped::Requested,
        res = &mut server => Stopped::Server(joined(res)),
        res = &mut scheduler => {
            if let Err(e) = res {
                tracing::error!(error = %e, "status scheduler task failed");
            }
            Stopped::Scheduler
        }
    };
    shutdown.cancel();

    match stopped {
        Stopped::Requested => {
            let res = joined(server.await);
            if let Err(e) = scheduler.await {
                tracing::error!(error = %e, "status scheduler task failed");
            }
            res
        }
        Stopped::Server(res) => {
            if let Err(e) = &res {
                tracing::error!(error = %e, "http server failed");
            }
            if let Err(e) = scheduler.await {
                tracing::error!(error = %e, "status scheduler task failed");
            }
            res.and(Err(anyhow::anyhow!("http server stopped unexpectedly")))
        }
        Stopped::Scheduler => {
            joined(server.await)?;
            anyhow::bail!("status scheduler stopped unexpectedly")
        }
    }
}
