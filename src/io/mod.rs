//! Mesh file formats.

mod msh;
mod stl;

pub use msh::{
    parse_msh, read_msh, sanitize_line_endings, write_msh, write_msh_to, write_msh_with_potential,
};
pub use stl::{parse_stl, read_stl, write_stl, write_stl_to};
