mod echo;
mod scripted;

pub use echo::EchoProvider;
pub use scripted::{ScriptedProvider, ScriptedTurn};
