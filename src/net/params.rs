//! Dragonfly 参数
//!
//! 拓扑配置、派生参数与端口/缓冲布局。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 路由策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingAlgo {
    Minimal,
    #[serde(alias = "nonminimal")]
    NonMinimal,
    Adaptive,
    ProgAdaptive,
}

/// 虚拟通道状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcState {
    Idle,
    Credit,
}

/// 输出端口类别：组内、跨组、计算节点。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortClass {
    Local,
    Global,
    Cn,
}

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("num_routers must be >= 4, got {0}")]
    TooFewRouters(usize),
    #[error("num_vcs must be >= 1")]
    NoVcs,
    #[error("bandwidth and buffer parameters must be positive")]
    NonPositive,
    #[error("topology inconsistency: total_routers {total} != num_groups {groups} * num_routers {routers}")]
    Inconsistent {
        total: usize,
        groups: usize,
        routers: usize,
    },
}

/// 配置文件中的 dragonfly 段；缺省值与参考实现一致。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DragonflyConfig {
    #[serde(default = "default_num_routers")]
    pub num_routers: usize,
    #[serde(default = "default_num_vcs")]
    pub num_vcs: usize,
    #[serde(default = "default_local_vc_size")]
    pub local_vc_size: u32,
    #[serde(default = "default_global_vc_size")]
    pub global_vc_size: u32,
    #[serde(default = "default_cn_vc_size")]
    pub cn_vc_size: u32,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_local_bandwidth")]
    pub local_bandwidth: f64,
    #[serde(default = "default_global_bandwidth")]
    pub global_bandwidth: f64,
    #[serde(default = "default_cn_bandwidth")]
    pub cn_bandwidth: f64,
    #[serde(default = "default_routing")]
    pub routing: RoutingAlgo,
    /// 拓扑/LP 数文件独立声明的路由器总数；与公式推导值不一致是致命错误。
    #[serde(default)]
    pub total_routers: Option<usize>,
}

fn default_num_routers() -> usize {
    4
}
fn default_num_vcs() -> usize {
    1
}
fn default_local_vc_size() -> u32 {
    1024
}
fn default_global_vc_size() -> u32 {
    2048
}
fn default_cn_vc_size() -> u32 {
    1024
}
fn default_chunk_size() -> u64 {
    64
}
fn default_local_bandwidth() -> f64 {
    5.25
}
fn default_global_bandwidth() -> f64 {
    4.7
}
fn default_cn_bandwidth() -> f64 {
    5.25
}
fn default_routing() -> RoutingAlgo {
    RoutingAlgo::Minimal
}

impl Default for DragonflyConfig {
    fn default() -> Self {
        Self {
            num_routers: default_num_routers(),
            num_vcs: default_num_vcs(),
            local_vc_size: default_local_vc_size(),
            global_vc_size: default_global_vc_size(),
            cn_vc_size: default_cn_vc_size(),
            chunk_size: default_chunk_size(),
            local_bandwidth: default_local_bandwidth(),
            global_bandwidth: default_global_bandwidth(),
            cn_bandwidth: default_cn_bandwidth(),
            routing: default_routing(),
            total_routers: None,
        }
    }
}

/// 校验后的参数集合，含全部派生量。
#[derive(Debug, Clone)]
pub struct DragonflyParams {
    pub num_routers: usize,
    pub num_vcs: usize,
    pub local_vc_size: u32,
    pub global_vc_size: u32,
    pub cn_vc_size: u32,
    pub chunk_size: u64,
    pub local_bandwidth: f64,
    pub global_bandwidth: f64,
    pub cn_bandwidth: f64,
    pub routing: RoutingAlgo,

    pub num_cn: usize,
    pub num_global_channels: usize,
    pub num_groups: usize,
    pub radix: usize,
    pub total_routers: usize,
    pub total_terminals: usize,
}

impl DragonflyParams {
    pub fn from_config(cfg: &DragonflyConfig) -> Result<Self, ParamError> {
        if cfg.num_routers < 4 {
            return Err(ParamError::TooFewRouters(cfg.num_routers));
        }
        if cfg.num_vcs == 0 {
            return Err(ParamError::NoVcs);
        }
        if cfg.local_bandwidth <= 0.0
            || cfg.global_bandwidth <= 0.0
            || cfg.cn_bandwidth <= 0.0
            || cfg.chunk_size == 0
            || cfg.local_vc_size == 0
            || cfg.global_vc_size == 0
            || cfg.cn_vc_size == 0
        {
            return Err(ParamError::NonPositive);
        }

        let num_cn = cfg.num_routers / 2;
        let num_global_channels = cfg.num_routers / 2;
        let num_groups = cfg.num_routers * num_cn + 1;
        let radix = cfg.num_vcs * (num_cn + num_global_channels + cfg.num_routers);
        let total_routers = num_groups * cfg.num_routers;
        let total_terminals = total_routers * num_cn;

        if let Some(declared) = cfg.total_routers {
            if declared != total_routers {
                return Err(ParamError::Inconsistent {
                    total: declared,
                    groups: num_groups,
                    routers: cfg.num_routers,
                });
            }
        }

        Ok(Self {
            num_routers: cfg.num_routers,
            num_vcs: cfg.num_vcs,
            local_vc_size: cfg.local_vc_size,
            global_vc_size: cfg.global_vc_size,
            cn_vc_size: cfg.cn_vc_size,
            chunk_size: cfg.chunk_size,
            local_bandwidth: cfg.local_bandwidth,
            global_bandwidth: cfg.global_bandwidth,
            cn_bandwidth: cfg.cn_bandwidth,
            routing: cfg.routing,
            num_cn,
            num_global_channels,
            num_groups,
            radix,
            total_routers,
            total_terminals,
        })
    }

    /// 端口布局：[0, num_routers) 组内，接着跨组，最后计算节点。
    pub fn port_class(&self, output_port: usize) -> PortClass {
        debug_assert!(output_port < self.radix / self.num_vcs);
        if output_port < self.num_routers {
            PortClass::Local
        } else if output_port < self.num_routers + self.num_global_channels {
            PortClass::Global
        } else {
            PortClass::Cn
        }
    }

    pub fn buffer_size(&self, class: PortClass) -> u32 {
        match class {
            PortClass::Local => self.local_vc_size,
            PortClass::Global => self.global_vc_size,
            PortClass::Cn => self.cn_vc_size,
        }
    }

    pub fn bandwidth(&self, class: PortClass) -> f64 {
        match class {
            PortClass::Local => self.local_bandwidth,
            PortClass::Global => self.global_bandwidth,
            PortClass::Cn => self.cn_bandwidth,
        }
    }

    pub fn num_chunks(&self, packet_size: u64) -> u64 {
        packet_size.div_ceil(self.chunk_size).max(1)
    }
}
