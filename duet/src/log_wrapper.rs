macro_rules! dispatch_log {
    ( $level:ident, $( $arg:expr ),+ ) => {
        {
            #[cfg(feature = "log")]
            log::$level!( $( $arg ),+ );
        }
    };
}

macro_rules! info {
    ( $( $arg:expr ),+ ) => { dispatch_log!(info, $( $arg ),+ ) };
}

macro_rules! debug {
    ( $( $arg:expr ),+ ) => { dispatch_log!(debug, $( $arg ),+ ) };
}

macro_rules! trace {
    ( $( $arg:expr ),+ ) => { dispatch_log!(trace, $( $arg ),+ ) };
}

macro_rules! warn {
    ( $( $arg:expr ),+ ) => { dispatch_log!(warn, $( $arg ),+ ) };
}

macro_rules! error {
    ( $( $arg:expr ),+ ) => { dispatch_log!(error, $( $arg ),+ ) };
}
