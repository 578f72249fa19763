#[cold]
#[inline(never)]
pub fn span_not_in_ctx<T>() -> T {
    panic!("Span not in context, this is a bug");
}

#[cold]
#[inline(never)]
pub fn empty_context_stack<T>() -> T {
    panic!("Popped a context while none was entered, this is a bug");
}

#[cold]
#[inline(never)]
pub fn report_error(what: &str, error: &crate::Error) {
    eprintln!("treelog: failed to {}: {}", what, error);
}

#[allow(clippy::needless_pass_by_value)]
#[cold]
#[inline(never)]
pub fn activation_failed<T>(error: crate::Error) -> T {
    panic!("Activating the log failed: {}", error);
}
