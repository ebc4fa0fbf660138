//! Typed shape of a bank statement analysis.
//!
//! The model is asked to return exactly this structure. The reward only
//! checks for presence of the top-level sections; the typed form is used by
//! the setup validator and for strict structured-output requests.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const ANALYSIS_SUMMARY: &str = "analysisSummary";
pub const QUALIFIED_INCOME_CALCULATION: &str = "qualifiedIncomeCalculation";
pub const DEPOSITS: &str = "deposits";
pub const TIME_PERIOD_AGGREGATES: &str = "timePeriodAggregates";
pub const RISK: &str = "risk";
pub const MARKDOWN_SUMMARY: &str = "markdownSummary";
pub const MONTHLY_AVERAGE_NET_DEPOSITS: &str = "monthlyAverageNetDeposits";

/// Top-level sections the reward looks for
pub const REQUIRED_SECTIONS: [&str; 5] = [
    ANALYSIS_SUMMARY,
    QUALIFIED_INCOME_CALCULATION,
    DEPOSITS,
    TIME_PERIOD_AGGREGATES,
    RISK,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub bank_name: String,
    pub statement_type: String,
    pub account_holder_name: String,
    pub account_number_last4: String,
    pub total_deposits: f64,
    pub total_withdrawals: f64,
    pub cash_flow: f64,
    pub average_deposits: f64,
    pub income_categories: Vec<String>,
    pub non_income_categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBreakdown {
    pub statement_ending_date: String,
    pub statement_dates: String,
    pub uploaded_pdf_filename: String,
    pub deposits: f64,
    pub less_transfers: f64,
    pub net_deposits: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeTotals {
    pub deposits: f64,
    pub less_transfers: f64,
    pub net_deposits: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifiedIncomeCalculation {
    pub monthly_breakdown: Vec<MonthlyBreakdown>,
    pub totals: IncomeTotals,
    pub monthly_average_net_deposits: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositTransaction {
    pub date: String,
    pub description: String,
    pub short_description: String,
    pub amount: f64,
    pub day: String,
    pub month: String,
    pub account_number_last4: String,
    pub pdf_filename: String,
    /// Deposit amount when over $25,000, otherwise 0
    pub large_deposit_amount: f64,
}

/// Values over the 1-6, 7-12 and full 12 month windows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodValues {
    pub months1_6: f64,
    pub months7_12: f64,
    pub months12: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePeriodAggregates {
    pub total_deposits: PeriodValues,
    pub total_income: PeriodValues,
    pub average_income: PeriodValues,
    pub expense_factor_percentage: PeriodValues,
    pub calculated_expense: PeriodValues,
    pub income_minus_expense: PeriodValues,
    pub ownership_factor_percentage: PeriodValues,
    pub qualified_income: PeriodValues,
    pub total_withdrawals: PeriodValues,
    pub nsf_count: PeriodValues,
    pub od_count: PeriodValues,
    pub cash_flow: PeriodValues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskAnswer {
    Yes,
    No,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub topic: String,
    pub result: RiskAnswer,
    #[serde(default)]
    pub notes: String,
}

/// Complete analysis as produced by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub analysis_summary: AnalysisSummary,
    pub qualified_income_calculation: QualifiedIncomeCalculation,
    pub deposits: Vec<DepositTransaction>,
    pub time_period_aggregates: TimePeriodAggregates,
    pub risk: Vec<RiskFactor>,
    #[serde(default)]
    pub markdown_summary: String,
}

impl AnalysisResult {
    /// Try to read a JSON value as a full analysis
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        Self::deserialize(value)
    }
}

fn period_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "months1_6": { "type": "number" },
            "months7_12": { "type": "number" },
            "months12": { "type": "number" }
        },
        "required": ["months1_6", "months7_12", "months12"],
        "additionalProperties": false
    })
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// JSON schema for strict structured output
pub fn response_schema() -> Value {
    let string = json!({ "type": "string" });
    let number = json!({ "type": "number" });
    let strings = json!({ "type": "array", "items": { "type": "string" } });

    let summary = object_schema(
        json!({
            "bankName": string,
            "statementType": string,
            "accountHolderName": string,
            "accountNumberLast4": string,
            "totalDeposits": number,
            "totalWithdrawals": number,
            "cashFlow": number,
            "averageDeposits": number,
            "incomeCategories": strings,
            "nonIncomeCategories": strings,
        }),
        &[
            "bankName",
            "statementType",
            "accountHolderName",
            "accountNumberLast4",
            "totalDeposits",
            "totalWithdrawals",
            "cashFlow",
            "averageDeposits",
            "incomeCategories",
            "nonIncomeCategories",
        ],
    );

    let monthly = object_schema(
        json!({
            "statementEndingDate": string,
            "statementDates": string,
            "uploadedPdfFilename": string,
            "deposits": number,
            "lessTransfers": number,
            "netDeposits": number,
        }),
        &[
            "statementEndingDate",
            "statementDates",
            "uploadedPdfFilename",
            "deposits",
            "lessTransfers",
            "netDeposits",
        ],
    );

    let income = object_schema(
        json!({
            "monthlyBreakdown": { "type": "array", "items": monthly },
            "totals": object_schema(
                json!({ "deposits": number, "lessTransfers": number, "netDeposits": number }),
                &["deposits", "lessTransfers", "netDeposits"],
            ),
            "monthlyAverageNetDeposits": number,
        }),
        &["monthlyBreakdown", "totals", MONTHLY_AVERAGE_NET_DEPOSITS],
    );

    let deposit = object_schema(
        json!({
            "date": string,
            "description": string,
            "shortDescription": string,
            "amount": number,
            "day": string,
            "month": string,
            "accountNumberLast4": string,
            "pdfFilename": string,
            "largeDepositAmount": {
                "type": "number",
                "description": "If the deposit is over $25,000, this field should contain the deposit amount. Otherwise, it must be 0."
            },
        }),
        &[
            "date",
            "description",
            "shortDescription",
            "amount",
            "day",
            "month",
            "accountNumberLast4",
            "pdfFilename",
            "largeDepositAmount",
        ],
    );

    let aggregate_keys = [
        "totalDeposits",
        "totalIncome",
        "averageIncome",
        "expenseFactorPercentage",
        "calculatedExpense",
        "incomeMinusExpense",
        "ownershipFactorPercentage",
        "qualifiedIncome",
        "totalWithdrawals",
        "nsfCount",
        "odCount",
        "cashFlow",
    ];
    let aggregate_props: serde_json::Map<String, Value> = aggregate_keys
        .iter()
        .map(|k| (k.to_string(), period_schema()))
        .collect();
    let aggregates = object_schema(Value::Object(aggregate_props), &aggregate_keys);

    let risk = object_schema(
        json!({
            "topic": string,
            "result": {
                "type": "string",
                "description": "The result of the risk check. Must be exactly 'Yes' or 'No'."
            },
            "notes": {
                "type": "string",
                "description": "Optional notes providing context for the risk. Can be an empty string."
            },
        }),
        &["topic", "result", "notes"],
    );

    object_schema(
        json!({
            ANALYSIS_SUMMARY: summary,
            QUALIFIED_INCOME_CALCULATION: income,
            DEPOSITS: { "type": "array", "items": deposit },
            TIME_PERIOD_AGGREGATES: aggregates,
            RISK: { "type": "array", "items": risk },
            MARKDOWN_SUMMARY: string,
        }),
        &[
            ANALYSIS_SUMMARY,
            QUALIFIED_INCOME_CALCULATION,
            DEPOSITS,
            TIME_PERIOD_AGGREGATES,
            RISK,
            MARKDOWN_SUMMARY,
        ],
    )
}
