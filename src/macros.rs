/// Registers several request handlers at once.
///
/// ```ignore
/// register_requests!(registry, {
///     "math.add" => add,
///     "echo" => |data| async move { Ok(Some(data)) },
/// });
/// ```
#[macro_export]
macro_rules! register_requests {
    ($registry:expr, { $($pattern:expr => $handler:expr),* $(,)? }) => {
        {
            $(
                $registry.register_request($pattern, $handler);
            )*
        }
    };
}

/// Registers several event handlers at once.
#[macro_export]
macro_rules! register_events {
    ($registry:expr, { $($pattern:expr => $handler:expr),* $(,)? }) => {
        {
            $(
                $registry.register_event($pattern, $handler);
            )*
        }
    };
}
