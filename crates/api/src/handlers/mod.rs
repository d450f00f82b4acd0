pub mod admin_recorridos;
pub mod runtime;
