//! Shared domain types for Boardroom.
//!
//! These are the rows the server stores and the payloads it accepts: board
//! members, the advice history they produce, and the picture catalogue used
//! for member avatars.

pub mod models;

pub use models::{
    ChainLink, History, HistoryQuery, Member, MemberPatch, NewHistory, NewMember, Picture,
    ValidationError,
};
