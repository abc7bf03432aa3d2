pub(crate) mod dial;
