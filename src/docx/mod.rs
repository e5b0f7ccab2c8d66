//! Mail merge over word-processing packages.
//!
//! A package is a zip of XML parts. [`package`] owns the container
//! boundary, [`xml`] the event-stream part model, and the remaining modules
//! implement the merge pipeline on top of those: [`tags`] finds `{{ field }}`
//! placeholders, [`rebuild`] reconstructs tagged paragraphs, [`drawing`] and
//! [`geometry`] produce page-fit picture embeds, [`rels`] keeps relationship
//! and content-type manifests consistent, and [`merge`] is the session tying
//! it all together.

pub mod drawing;
pub mod geometry;
pub mod image;
pub mod merge;
pub mod package;
pub mod rebuild;
pub mod rels;
pub mod tags;
pub mod xml;
