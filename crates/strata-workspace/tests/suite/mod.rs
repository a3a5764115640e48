mod artifacts;
mod invalidation;
mod producers;
mod support;
