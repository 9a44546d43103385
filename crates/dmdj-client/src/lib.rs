//! Client for a remote soundboard service: request orchestration, the push
//! state reducer, debounced controls, navbar gestures, playlist trees and
//! the voice effect editor.

pub mod busy;
pub mod console;
pub mod debounce;
pub mod editor;
pub mod error;
pub mod gesture;
pub mod orchestrator;
pub mod playlist;
pub mod push;
