/* Morph CLI
 *
 * Command implementations behind the `morph` binary: compile-checking a
 * schema document, decoding and normalizing inputs against it, and
 * drafting a schema from a sample.
 */

pub mod cmds;
