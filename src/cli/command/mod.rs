pub mod collect;
pub mod combine;
pub mod download;
pub mod inspect;
pub mod run;

pub use collect::collect;
pub use combine::combine;
pub use download::download;
pub use inspect::inspect;
pub use run::run;
