pub mod adapter;
pub mod arxiv;
pub mod crossref;
pub mod europepmc;
pub mod http;
pub mod openalex;
pub mod pubmed;
pub mod registry;
pub mod semantic_scholar;

mod util;

pub use adapter::{ProviderResponse, SourceAdapter};
pub use http::Http;
pub use registry::{Discipline, SourceRegistry};
