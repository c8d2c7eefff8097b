//! Test suites exercising the bridge over real sockets.

mod support;
