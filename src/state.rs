use std::sync::Arc;

use crate::{
    auth::jwt::JwtService,
    batch::{registry::BatchRegistry, BatchPipeline},
    config::{AppConfig, CertificateWording},
    documents::DocumentGenerator,
    import::Importer,
    layout::{
        phrases::{NeutralPhrases, PhrasePolicy, StandardPhrases},
        LayoutConfig, LayoutEngine,
    },
    render::DocumentRenderer,
    storage::ObjectStorage,
    store::RecordStore,
    verification::ResultService,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub jwt: JwtService,
    pub results: ResultService,
    pub documents: DocumentGenerator,
    pub batches: Arc<BatchPipeline>,
    pub registry: Arc<BatchRegistry>,
    pub importer: Importer,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        jwt: JwtService,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        let phrases: Arc<dyn PhrasePolicy> = match config.certificate_wording {
            CertificateWording::Standard => Arc::new(StandardPhrases),
            CertificateWording::Neutral => Arc::new(NeutralPhrases),
        };
        let engine = Arc::new(LayoutEngine::new(
            LayoutConfig::new(config.institution_name.clone(), config.program_years),
            phrases,
        ));
        let documents = DocumentGenerator::new(store.clone(), engine, renderer);
        let batches = Arc::new(BatchPipeline::new(
            store.clone(),
            documents.clone(),
            storage.clone(),
        ));
        let registry = Arc::new(BatchRegistry::new(config.batch_retention()));

        Self {
            results: ResultService::new(store.clone()),
            importer: Importer::new(store.clone()),
            store,
            config: Arc::new(config),
            storage,
            jwt,
            documents,
            batches,
            registry,
        }
    }
}
