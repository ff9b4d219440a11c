//! Periodic driver for sequential monitoring
//!
//! `tick` evaluates every active sequential experiment once. Hosts can call
//! it from their own scheduler or let `spawn` drive it from a tokio interval.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::domain::experiment::{
    AnalysisMethod, ExperimentId, ExperimentQuery, ExperimentRepository, ExperimentStatus,
};
use crate::domain::DomainError;

use super::experiment_service::ExperimentService;

/// Outcome of one scheduler tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickSummary {
    pub evaluated: Vec<ExperimentId>,
    pub stopped: Vec<ExperimentId>,
    pub failed: Vec<ExperimentId>,
}

/// Runs interim analyses for every active sequential experiment
#[derive(Debug)]
pub struct InterimAnalysisScheduler<R: ExperimentRepository> {
    service: Arc<ExperimentService<R>>,
}

impl<R: ExperimentRepository + 'static> InterimAnalysisScheduler<R> {
    pub fn new(service: Arc<ExperimentService<R>>) -> Self {
        Self { service }
    }

    /// Evaluate each eligible experiment once
    ///
    /// A failure for one experiment is logged and does not prevent the
    /// others from being evaluated.
    pub async fn tick(&self) -> Result<TickSummary, DomainError> {
        let query = ExperimentQuery::new()
            .with_status(ExperimentStatus::Active)
            .with_analysis_method(AnalysisMethod::Sequential);

        let experiments = self.service.list_experiments(&query).await?;
        let mut summary = TickSummary::default();

        for experiment in experiments {
            let id = experiment.id().clone();

            match self.service.perform_interim_analysis(id.as_str()).await {
                Ok(record) => {
                    if record.recommendation.should_stop() {
                        summary.stopped.push(id.clone());
                    }
                    summary.evaluated.push(id);
                }
                Err(e) => {
                    error!(experiment_id = %id, error = %e, "Interim analysis failed");
                    summary.failed.push(id);
                }
            }
        }

        debug!(
            evaluated = summary.evaluated.len(),
            stopped = summary.stopped.len(),
            failed = summary.failed.len(),
            "Interim analysis tick complete"
        );

        Ok(summary)
    }

    /// Drive `tick` on the service's configured monitor interval
    pub fn spawn_configured(self) -> JoinHandle<()> {
        let period = Duration::from_secs(self.service.settings().monitor_interval_secs.max(1));
        self.spawn(period)
    }

    /// Drive `tick` on a fixed period until the handle is aborted
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        info!(period_secs = period.as_secs(), "Starting interim analysis scheduler");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                if let Err(e) = self.tick().await {
                    error!(error = %e, "Interim analysis tick failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{
        Assignment, ConversionPolicy, EarlyStoppingRules, Experiment, MockExperimentRepository,
        StopReason, SubjectId, Variant, VariantId, DEFAULT_METRIC,
    };
    use crate::infrastructure::events::ManualClock;
    use crate::infrastructure::services::EngineSettings;
    use chrono::{DateTime, TimeZone, Utc};

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    fn experiment(
        id: &str,
        method: AnalysisMethod,
        rules: EarlyStoppingRules,
        counts: [(&str, u64, u64); 2],
    ) -> Experiment {
        let mut experiment = Experiment::new(ExperimentId::new(id).unwrap(), id, start_time())
            .with_analysis_method(method)
            .with_early_stopping(rules)
            .with_traffic_split(vec![50.0, 50.0]);

        for (variant, _, _) in counts {
            experiment = experiment.with_variant(Variant::new(VariantId::new(variant).unwrap(), variant));
        }

        experiment.start(start_time()).unwrap();

        for (variant, participants, conversions) in counts {
            for n in 0..participants {
                let subject = SubjectId::new(format!("{}-{}", variant, n)).unwrap();
                experiment
                    .record_assignment(Assignment::new(
                        experiment.id().clone(),
                        subject.clone(),
                        VariantId::new(variant).unwrap(),
                        start_time(),
                    ))
                    .unwrap();

                if n < conversions {
                    experiment
                        .record_conversion(&subject, DEFAULT_METRIC, 1.0, ConversionPolicy::default(), start_time())
                        .unwrap();
                }
            }
        }

        experiment
    }

    fn create_scheduler(
        repository: MockExperimentRepository,
        clock: Arc<ManualClock>,
    ) -> InterimAnalysisScheduler<MockExperimentRepository> {
        let service = ExperimentService::new(Arc::new(repository)).with_clock(clock);
        InterimAnalysisScheduler::new(Arc::new(service))
    }

    fn seq_repository() -> MockExperimentRepository {
        MockExperimentRepository::new().with_experiment(experiment(
            "seq",
            AnalysisMethod::Sequential,
            EarlyStoppingRules::default().with_planned_analyses(100),
            [("a", 40, 10), ("b", 40, 11)],
        ))
    }

    #[tokio::test]
    async fn test_tick_evaluates_only_active_sequential() {
        let repository = MockExperimentRepository::new()
            .with_experiment(experiment(
                "seq-a",
                AnalysisMethod::Sequential,
                EarlyStoppingRules::default(),
                [("a", 40, 10), ("b", 40, 11)],
            ))
            .with_experiment(experiment(
                "freq",
                AnalysisMethod::Frequentist,
                EarlyStoppingRules::default(),
                [("a", 40, 10), ("b", 40, 11)],
            ));

        let scheduler = create_scheduler(repository, Arc::new(ManualClock::new(start_time())));
        let summary = scheduler.tick().await.unwrap();

        assert_eq!(summary.evaluated, vec![ExperimentId::new("seq-a").unwrap()]);
        assert!(summary.stopped.is_empty());
        assert!(summary.failed.is_empty());
    }

    #[tokio::test]
    async fn test_tick_stops_after_maximum_duration() {
        let rules = EarlyStoppingRules::default().with_max_duration_secs(3_600);
        let repository = MockExperimentRepository::new().with_experiment(experiment(
            "seq",
            AnalysisMethod::Sequential,
            rules,
            [("a", 10, 1), ("b", 10, 2)],
        ));

        let clock = Arc::new(ManualClock::new(start_time()));
        let scheduler = create_scheduler(repository, clock.clone());

        let first = scheduler.tick().await.unwrap();
        assert!(first.stopped.is_empty());

        clock.advance(chrono::Duration::hours(2));
        let second = scheduler.tick().await.unwrap();
        assert_eq!(second.stopped, vec![ExperimentId::new("seq").unwrap()]);

        let stored = scheduler.service.get_experiment("seq").await.unwrap().unwrap();
        assert_eq!(stored.status(), ExperimentStatus::Stopped);
        assert_eq!(stored.stop_reason(), Some(StopReason::Duration));
        assert_eq!(stored.interim_analyses().len(), 2);

        // Stopped experiments are no longer picked up
        let third = scheduler.tick().await.unwrap();
        assert!(third.evaluated.is_empty());
    }

    #[tokio::test]
    async fn test_tick_surfaces_listing_errors() {
        let scheduler = create_scheduler(
            MockExperimentRepository::new().with_error(),
            Arc::new(ManualClock::new(start_time())),
        );

        assert!(matches!(
            scheduler.tick().await,
            Err(DomainError::Storage { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_runs_ticks() {
        let repository = MockExperimentRepository::new().with_experiment(experiment(
            "seq",
            AnalysisMethod::Sequential,
            EarlyStoppingRules::default(),
            [("a", 40, 10), ("b", 40, 11)],
        ));

        let scheduler = create_scheduler(repository, Arc::new(ManualClock::new(start_time())));
        let service = scheduler.service.clone();
        let handle = scheduler.spawn(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(150)).await;
        handle.abort();

        let stored = service.get_experiment("seq").await.unwrap().unwrap();
        assert!(stored.interim_analyses().len() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_configured_uses_monitor_interval() {
        let settings = EngineSettings {
            monitor_interval_secs: 600,
            ..EngineSettings::default()
        };
        let service = Arc::new(
            ExperimentService::new(Arc::new(seq_repository()))
                .with_clock(Arc::new(ManualClock::new(start_time())))
                .with_settings(settings),
        );
        let handle = InterimAnalysisScheduler::new(service.clone()).spawn_configured();

        // First tick fires immediately, the next one after the interval
        tokio::time::sleep(Duration::from_secs(300)).await;
        let early = service.get_experiment("seq").await.unwrap().unwrap();
        assert_eq!(early.interim_analyses().len(), 1);

        tokio::time::sleep(Duration::from_secs(400)).await;
        handle.abort();

        let later = service.get_experiment("seq").await.unwrap().unwrap();
        assert_eq!(later.interim_analyses().len(), 2);
    }
}
