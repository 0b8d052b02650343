pub mod result_store;
pub mod screening;
pub mod universe;

pub use result_store::ResultStore;
pub use screening::ScreeningPipeline;
pub use universe::SymbolUniverse;
