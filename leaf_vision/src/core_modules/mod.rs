pub mod clahe;
pub mod color_space;
pub mod composite;
pub mod corpus;
pub mod edges;
pub mod glyphs;
pub mod leaf_filters;
pub mod utils;
