#[path = "property/activation_sequences.rs"]
mod activation_sequences;
