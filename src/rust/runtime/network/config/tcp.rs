// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::network::consts::{
    DEFAULT_MAX_CONNECTIONS,
    DEFAULT_MSS,
    DEFAULT_MTU,
    DEFAULT_SOCKET_BUFFER_SIZE,
    MAX_MSS,
    MAX_WINDOW_SCALE,
    MIN_MSS,
    TCPIP_HEADER_SIZE,
};

//==============================================================================
// Structures
//==============================================================================

/// TCP Configuration Descriptor
#[derive(Clone, Debug)]
pub struct TcpConfig {
    /// Advertised Maximum Segment Size
    advertised_mss: usize,
    /// MTU of the Interface Facing the Guest
    mtu: usize,
    /// Scaling Factor Requested for the Receive Window (zero disables scaling)
    window_scale: u8,
    /// Size of the Buffer Holding Guest Data not yet Written to the Host
    receive_buffer_size: usize,
    /// Size of the Buffer Holding Host Data not yet Acknowledged by the Guest
    send_buffer_size: usize,
    /// Probe Idle Connections?
    keepalive: bool,
    /// Maximum Number of Live Connections
    max_connections: usize,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate Functions for TCP Configuration Descriptor
impl TcpConfig {
    /// Creates a TCP Configuration Descriptor.
    pub fn new(
        advertised_mss: Option<usize>,
        mtu: Option<usize>,
        window_scale: Option<u8>,
        receive_buffer_size: Option<usize>,
        send_buffer_size: Option<usize>,
        keepalive: Option<bool>,
        max_connections: Option<usize>,
    ) -> Self {
        let mut options = Self::default();

        if let Some(value) = advertised_mss {
            options = options.set_advertised_mss(value);
        }
        if let Some(value) = mtu {
            options = options.set_mtu(value);
        }
        if let Some(value) = window_scale {
            options = options.set_window_scale(value);
        }
        if let Some(value) = receive_buffer_size {
            options = options.set_receive_buffer_size(value);
        }
        if let Some(value) = send_buffer_size {
            options = options.set_send_buffer_size(value);
        }
        if let Some(value) = keepalive {
            options.keepalive = value;
        }
        if let Some(value) = max_connections {
            options = options.set_max_connections(value);
        }

        options
    }

    /// Gets the advertised maximum segment size in the target [TcpConfig].
    pub fn get_advertised_mss(&self) -> usize {
        self.advertised_mss
    }

    /// Gets the interface MTU in the target [TcpConfig].
    pub fn get_mtu(&self) -> usize {
        self.mtu
    }

    /// Gets the largest segment that fits the interface MTU.
    pub fn get_interface_mss(&self) -> usize {
        self.mtu - TCPIP_HEADER_SIZE
    }

    /// Gets the window scale in the target [TcpConfig]
    pub fn get_window_scale(&self) -> u8 {
        self.window_scale
    }

    /// Gets the receive buffer size in the target [TcpConfig].
    pub fn get_receive_buffer_size(&self) -> usize {
        self.receive_buffer_size
    }

    /// Gets the send buffer size in the target [TcpConfig].
    pub fn get_send_buffer_size(&self) -> usize {
        self.send_buffer_size
    }

    /// Gets the keepalive option in the target [TcpConfig].
    pub fn get_keepalive(&self) -> bool {
        self.keepalive
    }

    /// Gets the connection limit in the target [TcpConfig].
    pub fn get_max_connections(&self) -> usize {
        self.max_connections
    }

    /// Sets the advertised maximum segment size in the target [TcpConfig].
    fn set_advertised_mss(mut self, value: usize) -> Self {
        assert!(value >= MIN_MSS);
        assert!(value <= MAX_MSS);
        self.advertised_mss = value;
        self
    }

    /// Sets the interface MTU in the target [TcpConfig].
    fn set_mtu(mut self, value: usize) -> Self {
        assert!(value >= TCPIP_HEADER_SIZE + MIN_MSS);
        self.mtu = value;
        self
    }

    /// Sets the window scale in the target [TcpConfig]
    fn set_window_scale(mut self, value: u8) -> Self {
        assert!(value <= MAX_WINDOW_SCALE);
        self.window_scale = value;
        self
    }

    /// Sets the receive buffer size in the target [TcpConfig].
    fn set_receive_buffer_size(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.receive_buffer_size = value;
        self
    }

    /// Sets the send buffer size in the target [TcpConfig].
    fn set_send_buffer_size(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.send_buffer_size = value;
        self
    }

    /// Sets the connection limit in the target [TcpConfig].
    fn set_max_connections(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.max_connections = value;
        self
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

/// Default Trait Implementation for TCP Configuration Descriptor
impl Default for TcpConfig {
    /// Creates a TCP Configuration Descriptor with the default values.
    fn default() -> Self {
        TcpConfig {
            advertised_mss: DEFAULT_MSS,
            mtu: DEFAULT_MTU,
            window_scale: 0,
            receive_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            send_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            keepalive: true,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
