use anyhow::{Context, Result};
use factor_core::{FactorLogic, PerformanceReport, ReportMetadata};
use factor_data_services::{
    extract_metadata, load_report, preprocess_report, BacktestEngine, DataStore,
};
use factor_research::ResearchProcessor;
use std::path::{Path, PathBuf};

/// Factor files are named after at most this many title characters
const FACTOR_NAME_CHARS: usize = 20;

/// Result of ingesting a report and extracting its factor
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub metadata: ReportMetadata,
    pub processed_file: PathBuf,
    pub factor_logic: FactorLogic,
    pub factor_file: PathBuf,
}

impl ReportOutcome {
    /// Name used for the factor and result files
    pub fn factor_name(&self) -> String {
        factor_file_name(&self.metadata.title)
    }
}

/// Result of generating and running strategy code
#[derive(Debug, Clone)]
pub struct BacktestOutcome {
    /// Last saved version of the strategy code
    pub code_file: PathBuf,
    pub refinements: u32,
    /// `None` when every attempt failed or the run produced no returns
    pub performance: Option<PerformanceReport>,
    pub result_file: Option<PathBuf>,
}

/// Report → factor logic → strategy code → backtest → saved results
pub struct ReplicationPipeline {
    store: DataStore,
    processor: ResearchProcessor,
    engine: BacktestEngine,
    max_refinements: u32,
}

impl ReplicationPipeline {
    pub fn new(
        store: DataStore,
        processor: ResearchProcessor,
        engine: BacktestEngine,
        max_refinements: u32,
    ) -> Self {
        Self {
            store,
            processor,
            engine,
            max_refinements,
        }
    }

    /// Load, clean and save the report, then extract and save its factor logic.
    ///
    /// Metadata is read from the raw text since cleaning strips date
    /// separators.
    pub async fn process_report(&mut self, path: &Path) -> Result<ReportOutcome> {
        tracing::info!("=== Processing research report ===");
        tracing::info!("Loading report: {}", path.display());

        let raw = load_report(path)?;
        let metadata = extract_metadata(&raw);
        let content = preprocess_report(&raw);

        tracing::info!("Title: {}", metadata.title);
        tracing::info!("Date: {}", metadata.date.as_deref().unwrap_or("-"));
        tracing::info!("Author: {}", metadata.author);

        let processed_file = self.store.save_processed_report(&content, &metadata)?;

        tracing::info!("Extracting factor logic with {}", self.processor.model().identifier);
        let factor_logic = self
            .processor
            .extract_factor_logic(&content)
            .await
            .context("Factor logic extraction failed")?;

        let factor_file = self
            .store
            .save_factor_logic(&factor_logic, Some(&factor_file_name(&metadata.title)))?;

        Ok(ReportOutcome {
            metadata,
            processed_file,
            factor_logic,
            factor_file,
        })
    }

    /// Generate strategy code, run it, and refine it on failure up to the
    /// configured number of rounds
    pub async fn run_backtest(&mut self, report: &ReportOutcome) -> Result<BacktestOutcome> {
        tracing::info!("=== Running backtest ===");

        let mut code = self
            .processor
            .generate_backtest_code(&report.factor_logic)
            .await
            .context("Backtest code generation failed")?;
        let mut code_file = self.store.save_backtest_code(&code)?;

        let mut refinements = 0;
        let mut outcome = self.engine.try_run(&code).await;

        while let Err(e) = &outcome {
            if refinements >= self.max_refinements {
                break;
            }
            refinements += 1;
            tracing::warn!(
                "Backtest failed, refinement {}/{}: {}",
                refinements,
                self.max_refinements,
                e
            );

            code = self
                .processor
                .refine_backtest_code(&code, &e.to_string())
                .await
                .context("Backtest code refinement failed")?;
            code_file = self.store.save_backtest_code(&code)?;
            outcome = self.engine.try_run(&code).await;
        }

        let result = BacktestEngine::settle(outcome);
        let performance = result.as_ref().and_then(|r| self.engine.calculate_performance(r));
        if result.is_some() && performance.is_none() {
            tracing::warn!("Backtest produced no daily returns");
        }

        let result_file = match &performance {
            Some(performance) => Some(self.store.save_result(performance, &report.factor_name())?),
            None => None,
        };

        Ok(BacktestOutcome {
            code_file,
            refinements,
            performance,
            result_file,
        })
    }
}

/// Title with spaces replaced by `_`, cut to the first 20 characters
pub fn factor_file_name(title: &str) -> String {
    title.replace(' ', "_").chars().take(FACTOR_NAME_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use factor_data_services::{BacktestError, BacktestResult, BacktestRunner, BacktestWindow};
    use factor_research::{
        CompletionBackend, CompletionRequest, LlmError, LlmRequester, LlmResponse, ModelConfig,
        RetryPolicy,
    };
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const REPORT: &str = "2024年量化动量因子研究\n作者：张三\n2024-03-15\n\n动量因子定义为过去20日收益率。\n";

    const FACTOR_REPLY: &str = r#"{
        "factor_name": "20日动量",
        "definition": "过去20个交易日的累计收益率",
        "parameters": [{"name": "lookback", "value": 20}],
        "data_requirements": ["日收盘价"],
        "stock_selection": "买入因子值最高的前10%股票"
    }"#;

    const CODE_REPLY: &str = "```python\ndef run_strategy(start_date, end_date, initial_capital):\n    return {\"daily_returns\": [0.01, -0.005]}\n```";

    struct ScriptedLlm(Mutex<VecDeque<&'static str>>);

    #[async_trait]
    impl CompletionBackend for ScriptedLlm {
        async fn complete(&self, request: CompletionRequest<'_>) -> Result<LlmResponse, LlmError> {
            let reply = self
                .0
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Transport("script exhausted".to_string()))?;
            Ok(LlmResponse {
                raw_response: reply.to_string(),
                model: request.model.identifier.clone(),
                tokens_used: None,
            })
        }
    }

    /// Fails the first `failures` runs, then returns fixed returns
    struct FlakyRunner {
        failures: Mutex<u32>,
        returns: Vec<f64>,
        runs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BacktestRunner for FlakyRunner {
        async fn run(
            &self,
            code: &str,
            _window: &BacktestWindow,
        ) -> Result<BacktestResult, BacktestError> {
            self.runs.lock().unwrap().push(code.to_string());
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(BacktestError::Process {
                    status: "exit status: 1".to_string(),
                    stderr: "ModuleNotFoundError: No module named 'vnpy'".to_string(),
                });
            }
            Ok(BacktestResult {
                daily_returns: self.returns.clone(),
            })
        }
    }

    fn pipeline(
        data_dir: &Path,
        replies: Vec<&'static str>,
        runner: Arc<FlakyRunner>,
        max_refinements: u32,
    ) -> ReplicationPipeline {
        let backend = Arc::new(ScriptedLlm(Mutex::new(replies.into())));
        let model = ModelConfig::new("gpt-4", "key", "http://localhost:9", 1024, 0.1);
        let processor = ResearchProcessor::new(model, LlmRequester::new(backend, RetryPolicy::immediate(1)));
        let engine = BacktestEngine::new(BacktestWindow::default(), runner);
        ReplicationPipeline::new(DataStore::new(data_dir), processor, engine, max_refinements)
    }

    fn runner(failures: u32, returns: Vec<f64>) -> Arc<FlakyRunner> {
        Arc::new(FlakyRunner {
            failures: Mutex::new(failures),
            returns,
            runs: Mutex::new(Vec::new()),
        })
    }

    fn write_report(dir: &Path) -> PathBuf {
        let path = dir.join("report.txt");
        std::fs::write(&path, REPORT).unwrap();
        path
    }

    #[test]
    fn test_factor_file_name() {
        assert_eq!(factor_file_name("Momentum Factor Study"), "Momentum_Factor_Stud");
        assert_eq!(factor_file_name("2024年量化动量因子研究"), "2024年量化动量因子研究");
    }

    #[tokio::test]
    async fn test_extract_only_flow() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = write_report(dir.path());
        let mut pipeline = pipeline(dir.path(), vec![FACTOR_REPLY], runner(0, vec![]), 0);

        let outcome = pipeline.process_report(&report_path).await.unwrap();

        assert_eq!(outcome.metadata.title, "2024年量化动量因子研究");
        assert_eq!(outcome.metadata.author, "张三");
        assert_eq!(outcome.metadata.date.as_deref(), Some("2024-03-15"));
        assert_eq!(outcome.factor_logic.factor_name, "20日动量");
        assert!(outcome.processed_file.exists());
        assert!(outcome
            .factor_file
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("2024年量化动量因子研究_"));

        let saved = DataStore::load_factor_logic(&outcome.factor_file).unwrap();
        assert_eq!(saved, outcome.factor_logic);
    }

    #[tokio::test]
    async fn test_backtest_with_refinement() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = write_report(dir.path());
        let runner = runner(1, vec![0.01, -0.005]);
        let mut pipeline = pipeline(
            dir.path(),
            vec![FACTOR_REPLY, CODE_REPLY, CODE_REPLY],
            runner.clone(),
            2,
        );

        let report = pipeline.process_report(&report_path).await.unwrap();
        let outcome = pipeline.run_backtest(&report).await.unwrap();

        assert_eq!(outcome.refinements, 1);
        assert_eq!(runner.runs.lock().unwrap().len(), 2);
        let performance = outcome.performance.unwrap();
        assert!((performance.total_return - 0.005).abs() < 1e-12);

        let result_file = outcome.result_file.unwrap();
        assert!(result_file.starts_with(dir.path().join("results")));
        assert!(outcome.code_file.starts_with(dir.path().join("backtest_code")));
    }

    #[tokio::test]
    async fn test_backtest_failure_without_refinement_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = write_report(dir.path());
        let runner = runner(5, vec![]);
        let mut pipeline = pipeline(dir.path(), vec![FACTOR_REPLY, CODE_REPLY], runner.clone(), 0);

        let report = pipeline.process_report(&report_path).await.unwrap();
        let outcome = pipeline.run_backtest(&report).await.unwrap();

        assert_eq!(outcome.refinements, 0);
        assert_eq!(runner.runs.lock().unwrap().len(), 1);
        assert!(outcome.performance.is_none());
        assert!(outcome.result_file.is_none());
    }

    #[tokio::test]
    async fn test_missing_report_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), vec![], runner(0, vec![]), 0);

        let err = pipeline
            .process_report(&dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.txt"));
    }
}
