//! Application server
//!
//! This module provides the main application server implementation
//! including initialization, background jobs and graceful shutdown handling.

use crate::{
    config::Settings,
    jobs::{spawn_periodic, Job, JobHandle},
    server::{routes, state::AppState},
};
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

/// Main application struct
pub struct App {
    settings: Settings,
    state: AppState,
}

impl App {
    /// Create a new application instance
    pub async fn new(settings: Settings) -> Result<Self> {
        tracing::debug!("Initializing application state");
        let state = AppState::new(settings.clone()).await?;

        Ok(Self { settings, state })
    }

    /// Spawn the enabled background jobs
    pub fn start_jobs(&self) -> Vec<JobHandle> {
        let jobs = &self.settings.jobs;
        let mut handles = Vec::new();

        if jobs.refresher_enabled {
            let job: Arc<dyn Job> = self.state.refresher.clone();
            handles.push(spawn_periodic(job, jobs.refresh_interval()));
        } else {
            tracing::info!("Rate refresher disabled");
        }

        if jobs.cleaner_enabled {
            let job: Arc<dyn Job> = self.state.cleaner.clone();
            handles.push(spawn_periodic(job, jobs.cleaner_interval()));
        } else {
            tracing::info!("Cache cleaner disabled");
        }

        handles
    }

    /// Run the server with graceful shutdown support
    ///
    /// The server will shut down gracefully when receiving SIGINT (Ctrl+C)
    /// or SIGTERM signals. Background jobs stop once the server has drained.
    pub async fn run_with_graceful_shutdown(self) -> Result<()> {
        let addr = self.settings.server_addr().parse::<SocketAddr>()?;
        let router = routes::create_router(self.state.clone());

        let jobs = self.start_jobs();

        tracing::info!("Starting server on {} with graceful shutdown enabled", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        Self::stop_jobs(jobs).await;
        served?;

        Ok(())
    }

    async fn stop_jobs(jobs: Vec<JobHandle>) {
        tracing::info!(jobs = jobs.len(), "Stopping background jobs");
        for job in jobs {
            job.stop().await;
        }
    }
}

/// Create a future that completes when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
