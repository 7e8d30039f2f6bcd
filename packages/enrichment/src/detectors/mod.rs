//! Language model implementations.

pub mod whatlang;

pub use self::whatlang::WhatlangModel;
