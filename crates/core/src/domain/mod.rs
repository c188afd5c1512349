pub mod negotiation;
pub mod product;
