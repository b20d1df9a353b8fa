pub mod logger;
pub mod suggest;

pub use logger::init_logging;
pub use suggest::find_best_match;
