//! Answer composition: generative and extractive strategies plus citation
//! formatting over retrieved chunks.

pub mod citations;
pub mod extractive;
pub mod generative;

pub use citations::format_citations;
pub use extractive::extractive_answer;
pub use generative::generative_answer;
