//! # Tally XML Framing
//!
//! Request envelopes and response parsing for the Tally XML interface.
//!
//! Requests are small and fixed-shape, so they are written directly with
//! escaped values. Responses vary between Tally releases (element order,
//! `ALLINVENTORYENTRIES.LIST` vs `INVENTORYENTRIES.LIST`, attributes vs child
//! elements), so they are read into a small element tree first and queried
//! by name.

use std::fmt::Write as _;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SyncError, SyncResult};
use crate::tally::{ClosingBalance, ImportOutcome, InventoryLine, OutboundVoucher, TallyVoucher};

const VOUCHER_COLLECTION: &str = "IronMartModifiedVouchers";
const STOCK_COLLECTION: &str = "IronMartClosingBalances";

// =============================================================================
// Request Builders
// =============================================================================

fn static_variables(out: &mut String, company: Option<&str>) {
    out.push_str("<STATICVARIABLES><SVEXPORTFORMAT>$$SysName:XML</SVEXPORTFORMAT>");
    if let Some(company) = company {
        let _ = write!(out, "<SVCURRENTCOMPANY>{}</SVCURRENTCOMPANY>", escape(company));
    }
    out.push_str("</STATICVARIABLES>");
}

fn leaf(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, "<{name}>{}</{name}>", escape(value));
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// `Import Data` envelope for one voucher.
///
/// `ACTION="Create"` with a known `REMOTEID` alters the existing voucher
/// instead of adding a second one.
pub fn import_voucher_request(voucher: &OutboundVoucher, company: Option<&str>) -> String {
    let inward = voucher.is_inward();
    // Tally signs: credit amounts positive, debit amounts negative.
    let item_sign = if inward { -1 } else { 1 };

    let mut out = String::with_capacity(1024 + voucher.lines.len() * 512);
    out.push_str("<ENVELOPE><HEADER><TALLYREQUEST>Import Data</TALLYREQUEST></HEADER>");
    out.push_str("<BODY><IMPORTDATA><REQUESTDESC><REPORTNAME>Vouchers</REPORTNAME>");
    static_variables(&mut out, company);
    out.push_str("</REQUESTDESC><REQUESTDATA><TALLYMESSAGE xmlns:UDF=\"TallyUDF\">");

    let _ = write!(
        out,
        "<VOUCHER REMOTEID=\"{}\" VCHTYPE=\"{}\" ACTION=\"Create\" OBJVIEW=\"Invoice Voucher View\">",
        escape(voucher.remote_id.as_str()),
        voucher.voucher_type()
    );
    leaf(&mut out, "DATE", &voucher.date.format("%Y%m%d").to_string());
    leaf(&mut out, "VOUCHERTYPENAME", voucher.voucher_type());
    leaf(&mut out, "VOUCHERNUMBER", &voucher.voucher_number);
    leaf(&mut out, "REFERENCE", &voucher.remote_id);
    leaf(&mut out, "PARTYLEDGERNAME", &voucher.party_ledger);
    leaf(&mut out, "NARRATION", &voucher.narration);
    leaf(&mut out, "PERSISTEDVIEW", "Invoice Voucher View");
    leaf(&mut out, "ISINVOICE", "Yes");

    for line in &voucher.lines {
        let amount = (line.amount() * item_sign).to_tally_amount();
        let qty = format!("{} Nos", line.quantity);

        out.push_str("<ALLINVENTORYENTRIES.LIST>");
        leaf(&mut out, "STOCKITEMNAME", &line.stock_item);
        leaf(&mut out, "ISDEEMEDPOSITIVE", yes_no(inward));
        leaf(&mut out, "RATE", &format!("{}/Nos", line.rate.to_tally_amount()));
        leaf(&mut out, "AMOUNT", &amount);
        leaf(&mut out, "ACTUALQTY", &qty);
        leaf(&mut out, "BILLEDQTY", &qty);
        out.push_str("<ACCOUNTINGALLOCATIONS.LIST>");
        leaf(&mut out, "LEDGERNAME", &voucher.ledger);
        leaf(&mut out, "ISDEEMEDPOSITIVE", yes_no(inward));
        leaf(&mut out, "AMOUNT", &amount);
        out.push_str("</ACCOUNTINGALLOCATIONS.LIST></ALLINVENTORYENTRIES.LIST>");
    }

    out.push_str("<LEDGERENTRIES.LIST>");
    leaf(&mut out, "LEDGERNAME", &voucher.party_ledger);
    leaf(&mut out, "ISDEEMEDPOSITIVE", yes_no(!inward));
    leaf(&mut out, "ISPARTYLEDGER", "Yes");
    leaf(
        &mut out,
        "AMOUNT",
        &(voucher.total() * -item_sign).to_tally_amount(),
    );
    out.push_str("</LEDGERENTRIES.LIST>");

    out.push_str("</VOUCHER></TALLYMESSAGE></REQUESTDATA></IMPORTDATA></BODY></ENVELOPE>");
    out
}

/// Collection export of every voucher altered after `alter_id`.
pub fn export_vouchers_request(alter_id: i64, company: Option<&str>) -> String {
    let mut out = String::with_capacity(1024);
    let _ = write!(
        out,
        "<ENVELOPE><HEADER><VERSION>1</VERSION><TALLYREQUEST>Export</TALLYREQUEST>\
         <TYPE>Collection</TYPE><ID>{VOUCHER_COLLECTION}</ID></HEADER><BODY><DESC>"
    );
    static_variables(&mut out, company);
    let _ = write!(
        out,
        "<TDL><TDLMESSAGE><COLLECTION NAME=\"{VOUCHER_COLLECTION}\" ISMODIFY=\"No\">\
         <TYPE>Voucher</TYPE>\
         <FETCH>GUID, ALTERID, DATE, VOUCHERTYPENAME, VOUCHERNUMBER, REFERENCE, ISCANCELLED, \
         ALLINVENTORYENTRIES.LIST</FETCH>\
         <FILTER>IronMartAfterAlterId</FILTER></COLLECTION>\
         <SYSTEM TYPE=\"Formulae\" NAME=\"IronMartAfterAlterId\">$ALTERID &gt; {alter_id}</SYSTEM>\
         </TDLMESSAGE></TDL></DESC></BODY></ENVELOPE>"
    );
    out
}

/// Collection export of every stock item with its closing balance.
pub fn export_closing_balances_request(company: Option<&str>) -> String {
    let mut out = String::with_capacity(768);
    let _ = write!(
        out,
        "<ENVELOPE><HEADER><VERSION>1</VERSION><TALLYREQUEST>Export</TALLYREQUEST>\
         <TYPE>Collection</TYPE><ID>{STOCK_COLLECTION}</ID></HEADER><BODY><DESC>"
    );
    static_variables(&mut out, company);
    let _ = write!(
        out,
        "<TDL><TDLMESSAGE><COLLECTION NAME=\"{STOCK_COLLECTION}\" ISMODIFY=\"No\">\
         <TYPE>StockItem</TYPE><FETCH>NAME, CLOSINGBALANCE</FETCH></COLLECTION>\
         </TDLMESSAGE></TDL></DESC></BODY></ENVELOPE>"
    );
    out
}

// =============================================================================
// Element Tree
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Trimmed text of a direct child, `None` when absent or blank.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }

    /// All elements named `name` below this node. Does not look inside a
    /// match.
    pub fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlNode>) {
        for child in &self.children {
            if child.name.eq_ignore_ascii_case(name) {
                out.push(child);
            } else {
                child.find_all(name, out);
            }
        }
    }

    /// First element named `name` in document order.
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        for child in &self.children {
            if child.name.eq_ignore_ascii_case(name) {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }
}

fn element(start: &BytesStart<'_>) -> SyncResult<XmlNode> {
    let mut node = XmlNode {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..Default::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(|e| SyncError::MalformedResponse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        node.attrs.push((key, value));
    }
    Ok(node)
}

/// Parses a response body into a tree rooted at a synthetic document node.
pub fn parse_document(xml: &str) -> SyncResult<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack = vec![XmlNode {
        name: "#document".to_string(),
        ..Default::default()
    }];

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(element(&start)?),
            Event::Empty(start) => {
                let node = element(&start)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                let raw = data.into_inner();
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&raw));
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(SyncError::MalformedResponse("unbalanced closing tag".into()));
                }
                if let Some(node) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(node);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(SyncError::MalformedResponse("unclosed element".into()));
    }
    stack
        .pop()
        .ok_or_else(|| SyncError::MalformedResponse("empty document".into()))
}

// =============================================================================
// Response Parsers
// =============================================================================

/// Leading number of a Tally quantity such as `" -12.00 Nos"` or
/// `"1,200 Nos = 12 Box"`, rounded to whole units.
pub fn parse_quantity(raw: &str) -> Option<i64> {
    let numeric: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '-' | '.' | ','))
        .filter(|c| *c != ',')
        .collect();
    if numeric.is_empty() {
        return None;
    }
    numeric.parse::<f64>().ok().map(|q| q.round() as i64)
}

fn is_yes(raw: Option<&str>) -> bool {
    raw.map(|v| v.eq_ignore_ascii_case("yes")).unwrap_or(false)
}

fn count(doc: &XmlNode, name: &str) -> i64 {
    doc.find(name)
        .and_then(|n| n.text.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

/// Reads an import result. Anything other than a clean create/alter is a
/// rejection carrying Tally's line errors.
pub fn parse_import_response(body: &str, reference: &str) -> SyncResult<ImportOutcome> {
    let doc = parse_document(body)?;

    if doc.find("CREATED").is_none() && doc.find("ERRORS").is_none() {
        return Err(SyncError::MalformedResponse(format!(
            "import response without a result block: {}",
            truncate(body, 200)
        )));
    }

    let created = count(&doc, "CREATED");
    let altered = count(&doc, "ALTERED");
    let combined = count(&doc, "COMBINED");
    let errors = count(&doc, "ERRORS") + count(&doc, "EXCEPTIONS");

    if errors > 0 || created + altered + combined == 0 {
        let mut line_errors = Vec::new();
        doc.find_all("LINEERROR", &mut line_errors);
        let reason = if line_errors.is_empty() {
            format!("{} error(s), nothing created or altered", errors)
        } else {
            line_errors
                .iter()
                .map(|n| n.text.trim())
                .collect::<Vec<_>>()
                .join("; ")
        };
        return Err(SyncError::VoucherRejected {
            reference: reference.to_string(),
            reason,
        });
    }

    let voucher_id = doc
        .find("LASTVCHID")
        .map(|n| n.text.trim().to_string())
        .filter(|id| !id.is_empty() && id != "0");

    Ok(ImportOutcome {
        created,
        altered: altered + combined,
        voucher_id,
    })
}

const INVENTORY_LISTS: [&str; 4] = [
    "ALLINVENTORYENTRIES.LIST",
    "INVENTORYENTRIES.LIST",
    "INVENTORYENTRIESIN.LIST",
    "INVENTORYENTRIESOUT.LIST",
];

fn inventory_lines(voucher: &XmlNode) -> Vec<InventoryLine> {
    let mut lists = Vec::new();
    for name in INVENTORY_LISTS {
        voucher.find_all(name, &mut lists);
    }

    lists
        .into_iter()
        .filter_map(|entry| {
            let stock_item = entry.child_text("STOCKITEMNAME")?.to_string();
            let qty = entry
                .child_text("ACTUALQTY")
                .or_else(|| entry.child_text("BILLEDQTY"))
                .and_then(parse_quantity)
                .unwrap_or(0)
                .abs();
            let inward = is_yes(entry.child_text("ISDEEMEDPOSITIVE"));
            Some(InventoryLine {
                stock_item,
                quantity: if inward { qty } else { -qty },
            })
        })
        .collect()
}

pub fn parse_vouchers(body: &str) -> SyncResult<Vec<TallyVoucher>> {
    let doc = parse_document(body)?;
    let mut nodes = Vec::new();
    doc.find_all("VOUCHER", &mut nodes);

    nodes
        .into_iter()
        .map(|node| {
            let guid = node
                .child_text("GUID")
                .ok_or_else(|| SyncError::MalformedResponse("voucher without GUID".into()))?
                .to_string();
            let alter_id = node
                .child_text("ALTERID")
                .and_then(|a| a.parse::<i64>().ok())
                .ok_or_else(|| {
                    SyncError::MalformedResponse(format!("voucher {} without ALTERID", guid))
                })?;

            Ok(TallyVoucher {
                alter_id,
                voucher_type: node
                    .child_text("VOUCHERTYPENAME")
                    .or_else(|| node.attr("VCHTYPE"))
                    .unwrap_or_default()
                    .to_string(),
                voucher_number: node.child_text("VOUCHERNUMBER").map(String::from),
                reference: node.child_text("REFERENCE").map(String::from),
                remote_id: node.attr("REMOTEID").filter(|r| !r.is_empty()).map(String::from),
                cancelled: is_yes(node.child_text("ISCANCELLED")),
                lines: inventory_lines(node),
                guid,
            })
        })
        .collect()
}

pub fn parse_closing_balances(body: &str) -> SyncResult<Vec<ClosingBalance>> {
    let doc = parse_document(body)?;
    let mut nodes = Vec::new();
    doc.find_all("STOCKITEM", &mut nodes);

    Ok(nodes
        .into_iter()
        .filter_map(|node| {
            let name = node
                .attr("NAME")
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .or_else(|| node.child_text("NAME"))?;
            Some(ClosingBalance {
                stock_item: name.to_string(),
                quantity: node
                    .child_text("CLOSINGBALANCE")
                    .and_then(parse_quantity)
                    .unwrap_or(0),
            })
        })
        .collect())
}

pub(crate) fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
