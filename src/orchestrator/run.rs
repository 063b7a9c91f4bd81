use crate::config::{Config, TimingConfig};
use crate::error::{HarvestError, Result};
use crate::extract::{read_section, section, ListItem, ListReader, Record, RecordBuilder, SectionSpec};
use crate::navigate::{CloseOutcome, Controls, Delays, NavigationController, OpenOutcome};
use crate::orchestrator::events::{EventSink, RunEvent};
use crate::orchestrator::state::{ExtractionState, RunStatus};
use crate::page::{Clock, HostPage};
use crate::persist::{MemorySnapshotStore, RunSnapshot, SnapshotStore};
use chrono::NaiveDate;
use std::sync::Arc;

/// How a run ended and what it produced.
#[derive(Debug)]
pub struct RunSummary {
    pub status: RunStatus,
    pub records: Vec<Record>,
    pub error_count: usize,
    pub pages: usize,
    /// The error that ended the run, when it ended in `FAILED`.
    pub failure: Option<HarvestError>,
}

/// Walks every list page, one item at a time, and assembles a Record per item.
pub struct Orchestrator<P: HostPage> {
    nav: NavigationController<P>,
    list_reader: ListReader,
    sections: Vec<&'static SectionSpec>,
    timing: TimingConfig,
    events: Arc<dyn EventSink>,
    controls: Controls,
    store: Box<dyn SnapshotStore>,
    state: ExtractionState,
    reference_date: NaiveDate,
}

impl<P: HostPage> Orchestrator<P> {
    pub fn new(
        page: P,
        clock: Arc<dyn Clock>,
        config: &Config,
        events: Arc<dyn EventSink>,
        controls: Controls,
    ) -> Result<Self> {
        let delay_ms = config.timing.inter_item_delay_ms;
        let delays = Delays::from_config(&config.timing, delay_ms);

        let sections = config
            .extraction
            .sections
            .iter()
            .map(|name| {
                section(name).ok_or_else(|| HarvestError::Config {
                    message: format!("Unknown detail section '{}'", name),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            nav: NavigationController::new(page, clock, config, delays)?,
            list_reader: ListReader::new(&config.list)?,
            sections,
            timing: config.timing.clone(),
            events,
            controls,
            store: Box::new(MemorySnapshotStore::new()),
            state: ExtractionState::new(delay_ms),
            reference_date: chrono::Local::now().date_naive(),
        })
    }

    pub fn with_store(mut self, store: Box<dyn SnapshotStore>) -> Self {
        self.store = store;
        self
    }

    /// Date used to compute ages.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = date;
        self
    }

    /// Starts from previously captured progress instead of an empty run.
    pub fn with_state(mut self, snapshot: RunSnapshot) -> Self {
        self.state = ExtractionState::rehydrate(snapshot, self.state.inter_item_delay_ms());
        self
    }

    pub fn state(&self) -> &ExtractionState {
        &self.state
    }

    pub fn into_page(self) -> P {
        self.nav.into_page()
    }

    /// Runs until the last page, a stop command or a fatal error.
    ///
    /// Only an unusable `period_label` is reported as `Err`; everything that
    /// happens once the run has begun is described by the returned summary.
    pub async fn start(&mut self, period_label: &str, inter_item_delay_ms: u64) -> Result<RunSummary> {
        let period_label = period_label.trim();
        if period_label.is_empty() {
            return Err(HarvestError::Config {
                message: "A period label (série/ano) is required to start a run".to_string(),
            });
        }

        self.nav
            .set_delays(Delays::from_config(&self.timing, inter_item_delay_ms));
        self.state.set_inter_item_delay_ms(inter_item_delay_ms);
        self.state.set_status(RunStatus::Running);

        let outcome = match self.persist(true) {
            Ok(()) => self.run_pages(period_label).await,
            Err(e) => Err(e),
        };

        let (mut status, mut failure) = match outcome {
            Ok(()) => (RunStatus::Completed, None),
            Err(HarvestError::Cancelled) => {
                self.events
                    .warn("Extração interrompida pelo usuário.".to_string());
                (RunStatus::Cancelled, None)
            }
            Err(e) => {
                self.events.error(format!("Extração falhou: {}", e));
                (RunStatus::Failed, Some(e))
            }
        };

        if let Err(e) = self.persist(false) {
            self.events
                .error(format!("Não foi possível salvar o progresso: {}", e));
            if failure.is_none() {
                status = RunStatus::Failed;
                failure = Some(e);
            }
        }
        self.state.set_status(status);

        let total_records = self.state.records().len();
        let error_count = self.state.error_count();
        self.events.emit(RunEvent::Finished {
            total_records,
            status,
            error_count,
        });
        if status == RunStatus::Completed {
            self.events.success(format!(
                "Extração finalizada! {} alunos extraídos, {} erros.",
                total_records, error_count
            ));
        }

        Ok(RunSummary {
            status,
            records: self.state.records().to_vec(),
            error_count,
            pages: self.state.page(),
            failure,
        })
    }

    async fn run_pages(&mut self, period_label: &str) -> Result<()> {
        let total = self
            .nav
            .inspect(&mut self.controls, |html, detector| detector.total_hint(html))
            .await?;
        self.events.info(format!(
            "Iniciando extração... Total de registros: {}",
            total.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string())
        ));

        let mut previous_names: Option<Vec<String>> = None;

        loop {
            let page = self.state.advance_page();
            self.events.info(format!("Processando página {}...", page));

            if !self.nav.ensure_list(&mut self.controls).await? {
                if page == 1 {
                    return Err(HarvestError::Page {
                        message: format!("The student list is not visible on page {}", page),
                    });
                }
                self.events.warn(format!(
                    "Lista de alunos não encontrada na página {}; encerrando",
                    page
                ));
                return Ok(());
            }

            let reader = &self.list_reader;
            let items = self
                .nav
                .with_list(&mut self.controls, |table, _| reader.read(table))
                .await?
                .unwrap_or_default();

            if items.is_empty() {
                self.events
                    .error("Nenhum aluno encontrado nesta página".to_string());
                if page == 1 {
                    return Err(HarvestError::NoItemsFound { page });
                }
                return Ok(());
            }

            let names: Vec<String> = items.iter().map(|item| item.name.clone()).collect();
            if previous_names.as_ref() == Some(&names) {
                self.events.warn(format!(
                    "A página {} repete a anterior; encerrando a paginação",
                    page
                ));
                return Ok(());
            }
            self.events
                .info(format!("{} alunos na página {}", items.len(), page));

            for position in 1..=items.len() {
                self.pause_point().await?;
                self.visit(position, total, period_label).await?;
            }

            if !self.nav.next_page(&mut self.controls).await? {
                self.events
                    .info("Não há próxima página; todas as páginas foram processadas".to_string());
                return Ok(());
            }
            self.events
                .info(format!("Avançando para página {}...", page + 1));
            previous_names = Some(names);
        }
    }

    /// Holds the run between items while paused.
    async fn pause_point(&mut self) -> Result<()> {
        self.controls.checkpoint()?;
        if !self.controls.is_paused() {
            return Ok(());
        }

        self.state.set_status(RunStatus::Paused);
        self.events.info("Pausado".to_string());
        let tick = self.nav.delays().poll;
        self.controls.pause_gate(self.nav.clock(), tick).await?;
        self.state.set_status(RunStatus::Running);
        self.events.success("Retomado".to_string());
        Ok(())
    }

    /// Processes the item at `position` on the current page, re-read from the list.
    async fn visit(&mut self, position: usize, total: Option<usize>, period_label: &str) -> Result<()> {
        if !self.nav.ensure_list(&mut self.controls).await? {
            let ordinal = self.state.next_ordinal();
            let name = format!("item {}", ordinal);
            self.count_error(&name, "the detail overlay could not be closed".to_string());
            return self.persist(true);
        }

        let reader = &self.list_reader;
        let item = self
            .nav
            .with_list(&mut self.controls, |table, _| {
                reader.read(table).into_iter().nth(position - 1)
            })
            .await?
            .flatten();

        let Some(item) = item else {
            self.events.warn(format!(
                "O item {} não está mais na lista; ignorado",
                position
            ));
            return Ok(());
        };

        let ordinal = self.state.next_ordinal();
        self.events.emit(RunEvent::Item {
            index: ordinal,
            total,
            name: item.name.clone(),
        });

        match self.process_item(&item, ordinal, period_label).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                self.count_error(&item.name, e.to_string());
                if let Err(e) = self.nav.close_detail(&mut self.controls).await {
                    if e.is_fatal() {
                        return Err(e);
                    }
                }
            }
        }

        self.persist(true)
    }

    async fn process_item(&mut self, item: &ListItem, ordinal: usize, period_label: &str) -> Result<()> {
        let mut builder = RecordBuilder::seed(period_label, ordinal, item);

        let Some(view) = &item.view else {
            self.events
                .warn(format!("Sem botão Visualizar para {}", item.name));
            self.state.push_record(builder.degraded());
            return Ok(());
        };

        if self.nav.open_detail(view, &mut self.controls).await? == OpenOutcome::TimedOut {
            self.events
                .warn(format!("Modal não abriu a tempo para {}", item.name));
            let present = self
                .nav
                .with_detail(&mut self.controls, |_| ())
                .await?
                .is_some();
            if !present {
                self.state.push_record(builder.degraded());
                self.close_quietly(&item.name).await?;
                return Ok(());
            }
        }

        for spec in self.sections.clone() {
            if !self.nav.switch_section(spec.name, &mut self.controls).await? {
                self.events
                    .warn(format!("Aba \"{}\" não encontrada", spec.name));
            }

            let fields = self
                .nav
                .with_detail(&mut self.controls, |container| read_section(container, spec))
                .await?;
            match fields {
                Some(fields) => builder.overlay(&fields),
                None => self.events.warn(format!(
                    "Detalhe de {} não estava visível ao ler \"{}\"",
                    item.name, spec.name
                )),
            }
        }

        let record = if builder.detail_read() {
            builder.finish(self.reference_date)
        } else {
            builder.degraded()
        };
        self.state.push_record(record);
        self.events.success(format!("✓ {}", item.name));

        self.close_quietly(&item.name).await
    }

    async fn close_quietly(&mut self, name: &str) -> Result<()> {
        if self.nav.close_detail(&mut self.controls).await? == CloseOutcome::StillOpen {
            self.events
                .warn(format!("Não foi possível fechar o detalhe de {}", name));
        }
        Ok(())
    }

    fn count_error(&mut self, name: &str, message: String) {
        self.state.record_error();
        self.events
            .error(format!("Erro em {}: {}", name, message));
        self.events.emit(RunEvent::ItemError {
            name: name.to_string(),
            message,
        });
    }

    fn persist(&self, running: bool) -> Result<()> {
        self.store.save(&self.state.snapshot(running))
    }
}
