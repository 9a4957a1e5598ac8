// ==========================================
// 仓库补货预测系统 - 领域类型定义
// ==========================================
// 职责: 年月值类型 + 所有封闭枚举（分类/方法/来源/状态/紧急等级）
// 红线: 枚举的字符串形式即数据库存储形式，禁止随意改名
// ==========================================

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 年月 (YearMonth)
// ==========================================
// 存储格式: "YYYY-MM"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// 创建年月（月份必须在 1..=12）
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return None;
        }
        Some(Self { year, month })
    }

    /// 解析 "YYYY-MM"
    pub fn parse(s: &str) -> Option<Self> {
        let (y, m) = s.trim().split_once('-')?;
        let year = y.parse::<i32>().ok()?;
        let month = m.parse::<u32>().ok()?;
        Self::new(year, month)
    }

    /// 日期所在的年月
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// 月份下标（0 = 一月）
    pub fn month_index(&self) -> usize {
        (self.month - 1) as usize
    }

    pub fn next(&self) -> Self {
        self.add_months(1)
    }

    pub fn prev(&self) -> Self {
        self.add_months(-1)
    }

    /// 加减月数（负数为向前）
    pub fn add_months(&self, months: i32) -> Self {
        let total = self.year * 12 + (self.month as i32 - 1) + months;
        Self {
            year: total.div_euclid(12),
            month: total.rem_euclid(12) as u32 + 1,
        }
    }

    /// 从 self 到 other 的月数差（other 在后为正）
    pub fn months_between(&self, other: &YearMonth) -> i32 {
        (other.year - self.year) * 12 + (other.month as i32 - self.month as i32)
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or_else(|| self.first_day())
    }

    pub fn days_in_month(&self) -> u32 {
        (self.next().first_day() - self.first_day()).num_days() as u32
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl From<YearMonth> for String {
    fn from(ym: YearMonth) -> Self {
        ym.to_string()
    }
}

impl TryFrom<String> for YearMonth {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        YearMonth::parse(&value).ok_or_else(|| format!("无效的年月格式: {}", value))
    }
}

// ==========================================
// ABC 价值分层
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbcCode {
    A, // 高价值
    B, // 中价值
    C, // 低价值
}

impl AbcCode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "A" => Some(AbcCode::A),
            "B" => Some(AbcCode::B),
            "C" => Some(AbcCode::C),
            _ => None,
        }
    }
}

impl fmt::Display for AbcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbcCode::A => write!(f, "A"),
            AbcCode::B => write!(f, "B"),
            AbcCode::C => write!(f, "C"),
        }
    }
}

// ==========================================
// XYZ 需求波动分层
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XyzCode {
    X, // 稳定
    Y, // 中等波动
    Z, // 高波动
}

impl XyzCode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "X" => Some(XyzCode::X),
            "Y" => Some(XyzCode::Y),
            "Z" => Some(XyzCode::Z),
            _ => None,
        }
    }
}

impl fmt::Display for XyzCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XyzCode::X => write!(f, "X"),
            XyzCode::Y => write!(f, "Y"),
            XyzCode::Z => write!(f, "Z"),
        }
    }
}

// ==========================================
// ABC×XYZ 九宫格分类
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub abc: AbcCode,
    pub xyz: XyzCode,
}

impl Classification {
    pub fn new(abc: AbcCode, xyz: XyzCode) -> Self {
        Self { abc, xyz }
    }

    /// 由原始代码解析；任一缺失或非法返回 None
    pub fn from_codes(abc: Option<&str>, xyz: Option<&str>) -> Option<Self> {
        Some(Self {
            abc: AbcCode::parse(abc?)?,
            xyz: XyzCode::parse(xyz?)?,
        })
    }

    /// 最保守的格子（C-Z）
    pub fn most_conservative() -> Self {
        Self::new(AbcCode::C, XyzCode::Z)
    }

    /// 格子代码，如 "AX"
    pub fn cell(&self) -> String {
        format!("{}{}", self.abc, self.xyz)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.abc, self.xyz)
    }
}

// ==========================================
// SKU 生命周期状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkuStatus {
    Active,       // 正常
    DeathRow,     // 待淘汰（清仓中）
    Discontinued, // 已停产
}

impl SkuStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkuStatus::Active => "active",
            SkuStatus::DeathRow => "death_row",
            SkuStatus::Discontinued => "discontinued",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "active" => SkuStatus::Active,
            "death_row" => SkuStatus::DeathRow,
            "discontinued" => SkuStatus::Discontinued,
            _ => SkuStatus::Discontinued,
        }
    }
}

impl fmt::Display for SkuStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 增长状态标记
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStatus {
    Normal,
    Viral,     // 爆款
    Declining, // 衰退
}

impl GrowthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthStatus::Normal => "normal",
            GrowthStatus::Viral => "viral",
            GrowthStatus::Declining => "declining",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "viral" => GrowthStatus::Viral,
            "declining" => GrowthStatus::Declining,
            _ => GrowthStatus::Normal,
        }
    }
}

// ==========================================
// 预测计算方法
// ==========================================
// 红线: 每条持久化的预测明细必须带非空方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalculationMethod {
    Weighted6m,
    Simple6m,
    Simple3m,
    LastMonth,
    TestLaunchPattern,
    LimitedDataFallback,
    NoData,
}

impl CalculationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationMethod::Weighted6m => "weighted-6m",
            CalculationMethod::Simple6m => "simple-6m",
            CalculationMethod::Simple3m => "simple-3m",
            CalculationMethod::LastMonth => "last-month",
            CalculationMethod::TestLaunchPattern => "test-launch-pattern",
            CalculationMethod::LimitedDataFallback => "limited-data-fallback",
            CalculationMethod::NoData => "no-data",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim() {
            "weighted-6m" => CalculationMethod::Weighted6m,
            "simple-6m" => CalculationMethod::Simple6m,
            "simple-3m" => CalculationMethod::Simple3m,
            "last-month" => CalculationMethod::LastMonth,
            "test-launch-pattern" => CalculationMethod::TestLaunchPattern,
            "limited-data-fallback" => CalculationMethod::LimitedDataFallback,
            _ => CalculationMethod::NoData,
        }
    }

    /// 统计窗口长度（月）；新品路径与无数据返回 None
    pub fn window_months(&self) -> Option<usize> {
        match self {
            CalculationMethod::Weighted6m | CalculationMethod::Simple6m => Some(6),
            CalculationMethod::Simple3m => Some(3),
            CalculationMethod::LastMonth => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 增长率来源
// ==========================================
// 红线: 每条持久化的预测明细必须带非空来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrowthRateSource {
    ManualOverride,
    SkuTrend,
    SkuTrendDeseasonalized,
    CategoryMedian,
    ViralFloor,
    DecliningCap,
    Default,
    ProvenDemandStockout,
}

impl GrowthRateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthRateSource::ManualOverride => "manual-override",
            GrowthRateSource::SkuTrend => "sku-trend",
            GrowthRateSource::SkuTrendDeseasonalized => "sku-trend-deseasonalized",
            GrowthRateSource::CategoryMedian => "category-median",
            GrowthRateSource::ViralFloor => "viral-floor",
            GrowthRateSource::DecliningCap => "declining-cap",
            GrowthRateSource::Default => "default",
            GrowthRateSource::ProvenDemandStockout => "proven-demand-stockout",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim() {
            "manual-override" => GrowthRateSource::ManualOverride,
            "sku-trend" => GrowthRateSource::SkuTrend,
            "sku-trend-deseasonalized" => GrowthRateSource::SkuTrendDeseasonalized,
            "category-median" => GrowthRateSource::CategoryMedian,
            "viral-floor" => GrowthRateSource::ViralFloor,
            "declining-cap" => GrowthRateSource::DecliningCap,
            "proven-demand-stockout" => GrowthRateSource::ProvenDemandStockout,
            _ => GrowthRateSource::Default,
        }
    }
}

impl fmt::Display for GrowthRateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 季节模式类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeasonalPatternType {
    None,
    SpringPeak,
    SummerPeak,
    FallPeak,
    WinterPeak,
    MultiPeak,
    Other,
}

impl SeasonalPatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonalPatternType::None => "none",
            SeasonalPatternType::SpringPeak => "spring-peak",
            SeasonalPatternType::SummerPeak => "summer-peak",
            SeasonalPatternType::FallPeak => "fall-peak",
            SeasonalPatternType::WinterPeak => "winter-peak",
            SeasonalPatternType::MultiPeak => "multi-peak",
            SeasonalPatternType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim() {
            "spring-peak" => SeasonalPatternType::SpringPeak,
            "summer-peak" => SeasonalPatternType::SummerPeak,
            "fall-peak" => SeasonalPatternType::FallPeak,
            "winter-peak" => SeasonalPatternType::WinterPeak,
            "multi-peak" => SeasonalPatternType::MultiPeak,
            "other" => SeasonalPatternType::Other,
            _ => SeasonalPatternType::None,
        }
    }
}

impl fmt::Display for SeasonalPatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 预测批次状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastRunStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ForecastRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastRunStatus::Pending => "pending",
            ForecastRunStatus::Queued => "queued",
            ForecastRunStatus::Running => "running",
            ForecastRunStatus::Completed => "completed",
            ForecastRunStatus::Failed => "failed",
            ForecastRunStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pending" => ForecastRunStatus::Pending,
            "queued" => ForecastRunStatus::Queued,
            "running" => ForecastRunStatus::Running,
            "completed" => ForecastRunStatus::Completed,
            "cancelled" => ForecastRunStatus::Cancelled,
            _ => ForecastRunStatus::Failed,
        }
    }

    /// 是否终态（完成/失败/取消）
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ForecastRunStatus::Completed | ForecastRunStatus::Failed | ForecastRunStatus::Cancelled
        )
    }
}

impl fmt::Display for ForecastRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 需求来源（补货建议）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandSource {
    Forecast,
    Blended,
    Historical,
}

impl DemandSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemandSource::Forecast => "forecast",
            DemandSource::Blended => "blended",
            DemandSource::Historical => "historical",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim() {
            "forecast" => DemandSource::Forecast,
            "blended" => DemandSource::Blended,
            _ => DemandSource::Historical,
        }
    }
}

impl fmt::Display for DemandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 补货紧急等级
// ==========================================
// 红线: 等级制，Ord 顺序 Skip < Optional < ShouldOrder < MustOrder
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Skip,
    Optional,
    ShouldOrder,
    MustOrder,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Skip => "skip",
            UrgencyLevel::Optional => "optional",
            UrgencyLevel::ShouldOrder => "should_order",
            UrgencyLevel::MustOrder => "must_order",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim() {
            "must_order" => UrgencyLevel::MustOrder,
            "should_order" => UrgencyLevel::ShouldOrder,
            "optional" => UrgencyLevel::Optional,
            _ => UrgencyLevel::Skip,
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 在途订单状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingOrderStatus {
    Ordered,
    Shipped,
    Received,
    Cancelled,
}

impl PendingOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingOrderStatus::Ordered => "ordered",
            PendingOrderStatus::Shipped => "shipped",
            PendingOrderStatus::Received => "received",
            PendingOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "ordered" => PendingOrderStatus::Ordered,
            "shipped" => PendingOrderStatus::Shipped,
            "received" => PendingOrderStatus::Received,
            _ => PendingOrderStatus::Cancelled,
        }
    }

    /// 仍在途（计入覆盖）
    pub fn is_open(&self) -> bool {
        matches!(self, PendingOrderStatus::Ordered | PendingOrderStatus::Shipped)
    }
}

// ==========================================
// 缺货模式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockoutPatternType {
    Chronic,
    Seasonal,
    DayOfWeek,
    Monthly,
}

impl StockoutPatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockoutPatternType::Chronic => "chronic",
            StockoutPatternType::Seasonal => "seasonal",
            StockoutPatternType::DayOfWeek => "day_of_week",
            StockoutPatternType::Monthly => "monthly",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "seasonal" => StockoutPatternType::Seasonal,
            "day_of_week" => StockoutPatternType::DayOfWeek,
            "monthly" => StockoutPatternType::Monthly,
            _ => StockoutPatternType::Chronic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => ConfidenceLevel::High,
            "medium" => ConfidenceLevel::Medium,
            _ => ConfidenceLevel::Low,
        }
    }
}

// ==========================================
// 学习调整类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjustmentType {
    GrowthRate,
    SeasonalFactor,
    MethodSwitch,
    VolatilityAdjustment,
    CategoryDefault,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::GrowthRate => "growth-rate",
            AdjustmentType::SeasonalFactor => "seasonal-factor",
            AdjustmentType::MethodSwitch => "method-switch",
            AdjustmentType::VolatilityAdjustment => "volatility-adjustment",
            AdjustmentType::CategoryDefault => "category-default",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim() {
            "seasonal-factor" => AdjustmentType::SeasonalFactor,
            "method-switch" => AdjustmentType::MethodSwitch,
            "volatility-adjustment" => AdjustmentType::VolatilityAdjustment,
            "category-default" => AdjustmentType::CategoryDefault,
            _ => AdjustmentType::GrowthRate,
        }
    }
}

impl fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 在途到货时间分桶
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingBucket {
    Overdue,  // 已逾期未到
    Imminent, // 复盘周期内到货
    Covered,  // 提前期+复盘周期内到货
    Future,   // 超出计划展望（不计入）
}

impl PendingBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingBucket::Overdue => "overdue",
            PendingBucket::Imminent => "imminent",
            PendingBucket::Covered => "covered",
            PendingBucket::Future => "future",
        }
    }
}
