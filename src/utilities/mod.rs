/*
 * btls - SecureStream/ReadinessSet: blocking TLS byte streams *with* readiness multiplexing
 * This is free and unencumbered software released into the public domain.
 */
mod buffer;
mod deadline;

pub(crate) use buffer::RecvBuffer;
pub(crate) use deadline::Deadline;
