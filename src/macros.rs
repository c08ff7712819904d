// Structured events compile away entirely when the `tracing` feature is off.
macro_rules! obs_event {
	($level:ident, $($arg:tt)+) => {
		#[cfg(feature = "tracing")]
		{
			tracing::$level!($($arg)+);
		}
	};
}
