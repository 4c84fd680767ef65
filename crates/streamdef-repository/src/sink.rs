use streamdef_types::Sink;

use crate::entity::EntityRepository;

/// Sinks of sources, at most `max_sinks_per_source` active per source.
pub type SinkRepository = EntityRepository<Sink>;
