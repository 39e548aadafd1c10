#![allow(unused_macros)]

// Library-side logging. Everything goes through the `hdcptest` target so the
// binary can filter driver chatter separately from its own output.

macro_rules! trace {
    ($($t:tt)*) => { hdcp_log!(trace, $($t)*) }
}

macro_rules! debug {
    ($($t:tt)*) => { hdcp_log!(debug, $($t)*) }
}

macro_rules! info {
    ($($t:tt)*) => { hdcp_log!(info, $($t)*) }
}

macro_rules! warn {
    ($($t:tt)*) => { hdcp_log!(warn, $($t)*) }
}

macro_rules! error {
    ($($t:tt)*) => { hdcp_log!(error, $($t)*) }
}

macro_rules! hdcp_log {
    ($level: ident, $($t:tt)*) => {{
        #[cfg(feature = "log")]
        { ::log::$level!(target: "hdcptest", $($t)*); };
        #[cfg(not(feature = "log"))]
        { if false { let _ = format_args!($($t)*); } };
    }}
}
