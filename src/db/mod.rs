/*!
The databases a grounder works against.

One [domain](domain::Domain) per predicate signature, holding the
ground atoms known for it: stable offsets, generation stamps,
fact/defined bits, and externally assigned truth.
The [store](domain::DomainStore) owns all domains of a grounder and
hands out the process-unique atom identifiers the emitter speaks in.
*/

pub mod domain;

pub use domain::{AtomData, Domain, DomainStore};
