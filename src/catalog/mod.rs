/*!
 * Gettext catalog handling.
 *
 * - `entry`: catalog data model (entries, header, catalog)
 * - `po`: PO/POT parsing and serialization
 * - `store`: merge, pending extraction, apply and atomic persistence
 */

pub mod entry;
pub mod po;
pub mod store;

pub use entry::{Catalog, CatalogEntry, Header, PluralForm, Template, entry_id, source_of};
pub use store::{ApplyOutcome, CatalogStore, PersistSnapshot, VerificationReport, mirror_whitespace};
