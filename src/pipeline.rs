//! Wires the address engine, dispatch table, observation layer, rebalancer and
//! decision engine into one running pipeline.

use crate::config::HaarcConfig;
use crate::sim::SimWorld;
use haarc_address::AddressEngine;
use haarc_core::{AlertSink, CapacitySource, Classifier, Error, LoadSource, Provisioner, Result};
use haarc_dispatch::DispatchTable;
use haarc_observe::{spawn_rebalancer, AdmissionCounts, FilterController, ObservationLayer};
use haarc_ooda::{
    Admission, Collaborators, DecisionEngine, EngineHandle, EngineStatus, HistorySummary, Ingress,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// External collaborators the pipeline calls out to.
#[derive(Clone)]
pub struct Services {
    pub classifier: Arc<dyn Classifier>,
    pub capacity: Arc<dyn CapacitySource>,
    pub provisioner: Arc<dyn Provisioner>,
    pub alerts: Arc<dyn AlertSink>,
    pub load: Arc<dyn LoadSource>,
}

impl Services {
    pub fn simulated(world: &SimWorld) -> Self {
        Self {
            classifier: world.classifier(),
            capacity: world.capacity(),
            provisioner: world.provisioner(),
            alerts: world.alerts(),
            load: world.load(),
        }
    }
}

/// End-of-run (or on-demand) figures, printed as JSON by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub admission: AdmissionCounts,
    pub engine: EngineStatus,
    pub decisions: HistorySummary,
    pub disabled_categories: Vec<String>,
}

pub struct Pipeline {
    ingress: Ingress,
    engine: EngineHandle,
    table: Arc<DispatchTable>,
    cancel: CancellationToken,
    engine_task: JoinHandle<()>,
    rebalancer: JoinHandle<()>,
}

impl Pipeline {
    /// Build every component from config and start the engine and rebalancer
    /// tasks. Range overlaps, bad watermarks and bad filter entries fail here.
    pub fn start(config: &HaarcConfig, services: Services) -> Result<Self> {
        let addresses = AddressEngine::new(config.address.clone())?;
        let table = Arc::new(DispatchTable::from_config(&config.dispatch)?);
        let filters = Arc::new(FilterController::from_config(&config.observe)?);
        let layer = Arc::new(ObservationLayer::new(
            addresses,
            filters.clone(),
            services.classifier,
            config.observe.classifier_timeout(),
        ));

        let (engine, handle) = DecisionEngine::new(
            config.engine.clone(),
            config.provisioning.clone(),
            table.clone(),
            Collaborators {
                capacity: services.capacity,
                provisioner: services.provisioner,
                alerts: services.alerts,
            },
        );

        let cancel = CancellationToken::new();
        let rebalancer = spawn_rebalancer(
            filters,
            services.load,
            config.observe.rebalance_interval(),
            cancel.child_token(),
        );
        let engine_task = tokio::spawn(engine.run());
        info!(
            "Pipeline started: {} routed ranges, {} filters",
            table.len(),
            layer.filters().snapshot().len()
        );

        Ok(Self {
            ingress: Ingress::new(layer, handle.clone()),
            engine: handle,
            table,
            cancel,
            engine_task,
            rebalancer,
        })
    }

    pub fn ingress(&self) -> &Ingress {
        &self.ingress
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn table(&self) -> &Arc<DispatchTable> {
        &self.table
    }

    pub fn report(&self) -> RunReport {
        collect_report(&self.ingress, &self.engine)
    }

    /// Stop the rebalancer, shut the engine down (pending acts are cancelled
    /// and noted in history) and wait for both tasks.
    pub async fn shutdown(self) -> RunReport {
        self.cancel.cancel();
        match self.engine.shutdown().await {
            Ok(()) | Err(Error::QueueClosed) => {}
            Err(e) => warn!("Engine shutdown: {}", e),
        }
        if let Err(e) = self.engine_task.await {
            warn!("Engine task ended abnormally: {}", e);
        }
        if let Err(e) = self.rebalancer.await {
            warn!("Rebalancer task ended abnormally: {}", e);
        }
        let report = collect_report(&self.ingress, &self.engine);
        info!(
            "Pipeline stopped after {} cycles, {} decisions",
            report.engine.cycles, report.decisions.total
        );
        report
    }
}

fn collect_report(ingress: &Ingress, engine: &EngineHandle) -> RunReport {
    RunReport {
        admission: ingress.layer().stats(),
        engine: engine.status(),
        decisions: engine.history().summary(),
        disabled_categories: ingress.layer().filters().disabled_categories(),
    }
}

/// Drive a pipeline with synthetic traffic for `duration`, then shut it down.
pub async fn simulate(config: &HaarcConfig, duration: Duration) -> Result<RunReport> {
    let world = SimWorld::new(config.simulation.clone());
    let pipeline = Pipeline::start(config, Services::simulated(&world))?;
    let events = world.events();

    let rate = config.simulation.events_per_sec.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(1) / rate);
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    let mut offered = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let ingress = pipeline.ingress().clone();
                let raw = events.next_event();
                offered += 1;
                // Classification latency must not slow the producer
                tokio::spawn(async move {
                    match ingress.offer(raw).await {
                        Ok(Admission::Shed) => debug!("Decision queue full, event shed"),
                        Ok(_) => {}
                        Err(e) => debug!("Offer failed: {}", e),
                    }
                });
            }
            _ = &mut deadline => break,
        }
    }

    info!(
        "Offered {} events; {} workers active at stop",
        offered,
        world.active_workers()
    );
    Ok(pipeline.shutdown().await)
}
