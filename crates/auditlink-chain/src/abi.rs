//! Solidity bindings for the audit consumer and badge NFT contracts.
//!
//! Only the functions and events the engine and minter touch are declared.

use alloy_sol_types::sol;

sol! {
    /// Consumer contract that forwards audit jobs to the decentralized compute network.
    interface IAuditConsumer {
        function sendAuditRequest(uint64 subscriptionId, string[] args) external returns (bytes32 requestId);

        function getRequestStatus(bytes32 requestId)
            external
            view
            returns (bool completed, bytes response, bytes errorPayload, string aiSummary);

        event AuditRequested(address indexed contractAddress, bytes32 indexed requestId);
    }

    /// Audit badge collection.
    interface IAuditBadge {
        function mintBadgeWithURI(address to, string uri) external returns (uint256);

        function tokenURI(uint256 tokenId) external view returns (string);

        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

        event BadgeMinted(address indexed to, uint256 indexed tokenId);
    }
}
