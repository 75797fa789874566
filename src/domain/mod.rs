// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain Rust structs and traits that define the core concepts
// of the segmentation system.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// A 2D MRI slice and its binary left atrium mask
pub mod slice;

// Checkpoint records and the top-K retention policy
pub mod checkpoint;

// Collaborator abstractions (slice sources, metric sinks)
pub mod traits;
