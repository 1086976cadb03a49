// src/collector/schedule.rs

use anyhow::{bail, Result};
use std::{future::Future, io, time::Duration};
use tokio::time::sleep;
use tracing::{info, warn};

use super::{Collector, CycleOutcome};

/// How a collection cycle ended, as far as the polling loop is concerned.
#[derive(Debug)]
pub enum Tick {
    Success(CycleOutcome),
    /// The remote side refused, could not be reached, or hung up mid-request;
    /// try again next period.
    Recoverable(anyhow::Error),
    /// Anything else; the loop stops and hands the error back.
    Fatal(anyhow::Error),
}

impl Tick {
    pub fn from_result(result: Result<CycleOutcome>) -> Self {
        match result {
            Ok(outcome) => Tick::Success(outcome),
            Err(err) if is_connection_error(&err) => Tick::Recoverable(err),
            Err(err) => Tick::Fatal(err),
        }
    }
}

/// True when `err`'s chain holds a transport failure: the connection could
/// not be established, or it was dropped before any response status arrived.
pub fn is_connection_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            return e.is_connect() || (e.is_request() && e.status().is_none());
        }
        if let Some(e) = cause.downcast_ref::<io::Error>() {
            return matches!(
                e.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            );
        }
        false
    })
}

pub fn validate_period(period_secs: i64) -> Result<Duration> {
    if period_secs <= 0 {
        bail!("period should be greater than zero, got {}", period_secs);
    }
    Ok(Duration::from_secs(period_secs as u64))
}

impl Collector {
    /// Collect, then sleep `period_secs`, forever.
    ///
    /// Connection failures skip the cycle; any other error ends the loop and is
    /// returned. Resolving `shutdown` stops the loop at once (mid-cycle
    /// included) and returns `Ok(())`.
    pub async fn collect_periodically<F>(
        &mut self,
        period_secs: i64,
        keep_raw_events_file: bool,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let period = validate_period(period_secs)?;

        info!(period_secs, keep_raw_events_file, "periodic collection is being started");
        info!("press Ctrl+C to exit");

        tokio::pin!(shutdown);
        loop {
            let tick = tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested during collection, stopping");
                    return Ok(());
                }
                result = self.collect(keep_raw_events_file) => Tick::from_result(result),
            };

            match tick {
                Tick::Success(_) => {}
                Tick::Recoverable(err) => {
                    warn!(
                        error = %err,
                        "connection failed, probably due to sending more requests than usual; skipping cycle"
                    );
                }
                Tick::Fatal(err) => return Err(err),
            }

            info!(period_secs, "waiting before the next collection");
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping");
                    return Ok(());
                }
                _ = sleep(period) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn non_positive_periods_are_rejected() {
        assert!(validate_period(0).is_err());
        assert!(validate_period(-1).is_err());
        assert_eq!(validate_period(10).unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn refused_io_error_is_recoverable_through_context() {
        let err = Err::<CycleOutcome, _>(io::Error::from(io::ErrorKind::ConnectionRefused))
            .context("GET http://127.0.0.1:1/lastupdate.txt")
            .unwrap_err();
        assert!(is_connection_error(&err));
        assert!(matches!(Tick::from_result(Err(err)), Tick::Recoverable(_)));
    }

    #[test]
    fn other_errors_are_fatal() {
        let parse = anyhow!("invalid archive URL \"<html>\"");
        assert!(matches!(Tick::from_result(Err(parse)), Tick::Fatal(_)));

        let disk = anyhow::Error::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(Tick::from_result(Err(disk)), Tick::Fatal(_)));
    }

    #[test]
    fn aborted_and_truncated_io_errors_are_recoverable() {
        for kind in [io::ErrorKind::ConnectionAborted, io::ErrorKind::UnexpectedEof] {
            let err = anyhow::Error::from(io::Error::from(kind)).context("streaming archive");
            assert!(is_connection_error(&err), "{:?} was not recoverable", kind);
        }
    }

    #[tokio::test]
    async fn unreachable_host_error_is_recoverable() {
        // bind then release a port so nothing is listening on it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
            .get(format!("http://127.0.0.1:{}/lastupdate.txt", port))
            .send()
            .await
            .unwrap_err();
        let err = anyhow::Error::from(err).context("GET status");
        assert!(is_connection_error(&err));
    }

    #[tokio::test]
    async fn connection_dropped_before_response_is_recoverable() {
        // accept, read the request, then hang up without answering
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            drop(stream);
        });

        let err = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
            .get(format!("http://127.0.0.1:{}/lastupdate.txt", port))
            .send()
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(err.status().is_none());
        let err = anyhow::Error::from(err).context("GET status");
        assert!(is_connection_error(&err));
        assert!(matches!(Tick::from_result(Err(err)), Tick::Recoverable(_)));
    }
}
