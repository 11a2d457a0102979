//! Running the cells of a notebook.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use super::{Cell, Notebook};
use crate::compiler::{CompilationRequest, CompilationResult};
use crate::engine::{Engine, MountResult, RunOutput};
use crate::language::{CompileOptions, Language};
use crate::render::HtmlRenderer;

/// What running one cell produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellOutput {
    /// The cell that ran.
    pub cell_id: String,
    /// Its language.
    pub language: Language,
    /// Compilation and execution results.
    pub run: RunOutput,
    /// Set when the cell produced an element and auto-mount is on.
    pub mount: Option<MountResult>,
}

impl CellOutput {
    /// Whether every step that ran succeeded.
    pub fn success(&self) -> bool {
        self.run.success() && self.mount.as_ref().is_none_or(|m| m.success)
    }
}

/// Runs notebook cells through a shared [`Engine`].
///
/// Cells never share state: each one is compiled and executed on its own, and
/// its element, if any, is mounted into the container named after the cell.
/// The engine's renderer must therefore accept one container per cell id:
/// either register them up front or use [`HtmlRenderer::auto_create`], as
/// [`Session::default`] does. With an [`Engine::new`] renderer and no
/// registered containers every auto-mount fails with a `Mount` error.
#[derive(Debug, Clone)]
pub struct Session {
    engine: Arc<Engine>,
    auto_mount: bool,
    options: CompileOptions,
}

impl Default for Session {
    /// A session over a fresh engine whose renderer creates a container for
    /// each cell on first mount.
    fn default() -> Self {
        let engine = Engine::builder()
            .renderer(Arc::new(HtmlRenderer::auto_create()))
            .build();
        Self::new(Arc::new(engine))
    }
}

impl Session {
    /// A session that mounts UI output automatically into containers named
    /// after the cells.
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            auto_mount: true,
            options: CompileOptions::default(),
        }
    }

    /// Turn automatic mounting on or off.
    pub fn auto_mount(mut self, auto_mount: bool) -> Self {
        self.auto_mount = auto_mount;
        self
    }

    /// Compile every cell with `options`.
    pub fn compile_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// The underlying engine.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Run a code cell. Markdown cells give `None`.
    pub async fn run_cell(&self, cell: &Cell) -> Option<CellOutput> {
        let language = cell.language()?;
        let compilation = self.engine.compile(&self.request(cell, language)).await;
        Some(self.finish(cell, language, compilation))
    }

    /// Run every code cell in order. A failing cell does not stop the rest.
    ///
    /// All cells are compiled up front, so they share one wait on the
    /// dependency gate; execution then proceeds cell by cell.
    pub async fn run_all(&self, notebook: &Notebook) -> Vec<CellOutput> {
        let code_cells: Vec<(&Cell, Language)> = notebook
            .cells
            .iter()
            .filter_map(|cell| cell.language().map(|language| (cell, language)))
            .collect();
        let compilations = join_all(
            code_cells
                .iter()
                .map(|(cell, language)| async move {
                    self.engine.compile(&self.request(cell, *language)).await
                }),
        )
        .await;

        let outputs: Vec<_> = code_cells
            .into_iter()
            .zip(compilations)
            .map(|((cell, language), compilation)| self.finish(cell, language, compilation))
            .collect();
        tracing::info!(
            notebook = %notebook.id,
            cells = outputs.len(),
            failed = outputs.iter().filter(|o| !o.success()).count(),
            "notebook run finished"
        );
        outputs
    }

    fn request(&self, cell: &Cell, language: Language) -> CompilationRequest {
        CompilationRequest::new(cell.source.as_str(), language).with_options(self.options.clone())
    }

    fn finish(&self, cell: &Cell, language: Language, compilation: CompilationResult) -> CellOutput {
        let execution = self.engine.execute(&compilation);
        let mount = match &execution {
            Some(execution)
                if self.auto_mount && execution.success && execution.produced_element.is_some() =>
            {
                Some(self.engine.mount(execution, &cell.id))
            }
            _ => None,
        };
        let run = RunOutput {
            compilation,
            execution,
        };
        tracing::debug!(cell = %cell.id, %language, success = run.success(), "cell finished");

        CellOutput {
            cell_id: cell.id.clone(),
            language,
            run,
            mount,
        }
    }
}
